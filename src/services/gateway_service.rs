use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Demo payment gateway. Validates card input the way a real acquirer
/// would, then resolves the charge from a table of canonical test cards,
/// falling back to a probabilistic outcome for any other valid number.
/// Business declines are data, not errors; only malformed input fails.
pub struct GatewayService {
    delay_ms: u64,
    success_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Unknown,
}

impl CardBrand {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardBrand::Visa => "Visa",
            CardBrand::Mastercard => "Mastercard",
            CardBrand::Amex => "Amex",
            CardBrand::Discover => "Discover",
            CardBrand::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CardDetails {
    pub number: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub cvv: String,
}

#[derive(Debug, Clone)]
pub struct ChargeSuccess {
    pub transaction_id: String,
    pub card_brand: CardBrand,
    pub card_last4: String,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ChargeDecline {
    pub message: String,
    pub card_brand: CardBrand,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone)]
pub enum ChargeResult {
    Approved(ChargeSuccess),
    Declined(ChargeDecline),
}

// Canonical test cards with deterministic outcomes
const CARD_SUCCESS: &str = "4242424242424242";
const CARD_DECLINED: &str = "4000000000000002";
const CARD_INSUFFICIENT_FUNDS: &str = "4000000000009995";
const CARD_EXPIRED: &str = "4000000000000069";

pub fn luhn_valid(number: &str) -> bool {
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let mut sum = 0u32;
    let mut double = false;
    for c in number.chars().rev() {
        let mut digit = c.to_digit(10).unwrap_or(0);
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
    }

    sum % 10 == 0
}

pub fn detect_brand(number: &str) -> CardBrand {
    if number.starts_with('4') {
        CardBrand::Visa
    } else if matches!(number.get(..2), Some("51" | "52" | "53" | "54" | "55")) {
        CardBrand::Mastercard
    } else if matches!(number.get(..2), Some("34" | "37")) {
        CardBrand::Amex
    } else if number.starts_with("6011") || number.starts_with("65") {
        CardBrand::Discover
    } else {
        CardBrand::Unknown
    }
}

/// Expiry is valid when the (year, month) pair is the current month or
/// later. Two-digit years are read as 2000+yy.
pub fn expiry_valid(month: u32, year: i32, today: NaiveDate) -> bool {
    if !(1..=12).contains(&month) {
        return false;
    }

    let year = if (0..100).contains(&year) { 2000 + year } else { year };

    year > today.year() || (year == today.year() && month >= today.month())
}

pub fn cvv_valid(cvv: &str, brand: CardBrand) -> bool {
    let expected_len = if brand == CardBrand::Amex { 4 } else { 3 };
    cvv.len() == expected_len && cvv.chars().all(|c| c.is_ascii_digit())
}

impl GatewayService {
    pub fn new(config: &Config) -> Self {
        Self {
            delay_ms: config.gateway_delay_ms,
            success_rate: config.gateway_success_rate,
        }
    }

    /// Construction with explicit knobs, used by tests to drop the latency.
    pub fn with_settings(delay_ms: u64, success_rate: f64) -> Self {
        Self {
            delay_ms,
            success_rate,
        }
    }

    /// Runs a charge against the simulator. Input validation happens up
    /// front so a malformed card never pays the latency cost.
    pub async fn charge(&self, card: &CardDetails) -> AppResult<ChargeResult> {
        let number: String = card.number.chars().filter(|c| !c.is_whitespace()).collect();

        if !(13..=19).contains(&number.len()) || !luhn_valid(&number) {
            return Err(AppError::Validation("Invalid card number".to_string()));
        }

        let today = Utc::now().date_naive();
        if !expiry_valid(card.expiry_month, card.expiry_year, today) {
            return Err(AppError::Validation(
                "Card expired or invalid expiry date".to_string(),
            ));
        }

        let brand = detect_brand(&number);
        if !cvv_valid(&card.cvv, brand) {
            return Err(AppError::Validation("Invalid CVV".to_string()));
        }

        // Synthetic processing latency
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        let processing_time_ms = self.delay_ms + random_jitter_ms();
        let last4 = number[number.len() - 4..].to_string();

        let decline_message = match number.as_str() {
            CARD_SUCCESS => None,
            CARD_DECLINED => Some("Your card was declined".to_string()),
            CARD_INSUFFICIENT_FUNDS => Some("Insufficient funds".to_string()),
            CARD_EXPIRED => Some("Your card has expired".to_string()),
            _ => {
                use rand::Rng;
                if rand::thread_rng().gen_bool(self.success_rate) {
                    None
                } else {
                    Some("Your card was declined".to_string())
                }
            }
        };

        match decline_message {
            None => Ok(ChargeResult::Approved(ChargeSuccess {
                transaction_id: format!("txn_{}", Uuid::new_v4().simple()),
                card_brand: brand,
                card_last4: last4,
                processing_time_ms,
            })),
            Some(message) => Ok(ChargeResult::Declined(ChargeDecline {
                message,
                card_brand: brand,
                processing_time_ms,
            })),
        }
    }

    /// Refund simulation. Always succeeds after the usual latency and
    /// returns a synthetic refund id for the caller to record.
    pub async fn refund(&self, transaction_id: &str) -> AppResult<String> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        tracing::info!("Refund issued for transaction {}", transaction_id);
        Ok(format!("re_{}", Uuid::new_v4().simple()))
    }
}

fn random_jitter_ms() -> u64 {
    use rand::Rng;
    rand::thread_rng().gen_range(0..250)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(number: &str, month: u32, year: i32, cvv: &str) -> CardDetails {
        CardDetails {
            number: number.to_string(),
            expiry_month: month,
            expiry_year: year,
            cvv: cvv.to_string(),
        }
    }

    fn gateway() -> GatewayService {
        GatewayService::with_settings(0, 0.8)
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4242424242424242"));
        assert!(luhn_valid("4000000000000002"));
        assert!(luhn_valid("5555555555554444"));
        assert!(luhn_valid("378282246310005"));
        assert!(!luhn_valid("4242424242424241"));
        assert!(!luhn_valid("1234567890123456"));
        assert!(!luhn_valid("4242abcd42424242"));
        assert!(!luhn_valid(""));
    }

    #[test]
    fn test_brand_detection() {
        assert_eq!(detect_brand("4242424242424242"), CardBrand::Visa);
        assert_eq!(detect_brand("5555555555554444"), CardBrand::Mastercard);
        assert_eq!(detect_brand("5105105105105100"), CardBrand::Mastercard);
        assert_eq!(detect_brand("378282246310005"), CardBrand::Amex);
        assert_eq!(detect_brand("341111111111111"), CardBrand::Amex);
        assert_eq!(detect_brand("6011111111111117"), CardBrand::Discover);
        assert_eq!(detect_brand("6511111111111110"), CardBrand::Discover);
        assert_eq!(detect_brand("9999999999999999"), CardBrand::Unknown);
    }

    #[test]
    fn test_expiry_validation() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert!(expiry_valid(6, 2024, today));
        assert!(expiry_valid(7, 2024, today));
        assert!(expiry_valid(1, 2025, today));
        assert!(!expiry_valid(5, 2024, today));
        assert!(!expiry_valid(12, 2023, today));
        assert!(!expiry_valid(0, 2025, today));
        assert!(!expiry_valid(13, 2025, today));
        // Two-digit years normalize to 2000+yy
        assert!(expiry_valid(12, 26, today));
        assert!(!expiry_valid(12, 23, today));
    }

    #[test]
    fn test_cvv_validation() {
        assert!(cvv_valid("123", CardBrand::Visa));
        assert!(!cvv_valid("1234", CardBrand::Visa));
        assert!(cvv_valid("1234", CardBrand::Amex));
        assert!(!cvv_valid("123", CardBrand::Amex));
        assert!(!cvv_valid("12a", CardBrand::Visa));
        assert!(!cvv_valid("12", CardBrand::Mastercard));
    }

    #[tokio::test]
    async fn test_canonical_success_card() {
        let result = gateway()
            .charge(&card("4242424242424242", 12, 2099, "123"))
            .await
            .unwrap();

        match result {
            ChargeResult::Approved(success) => {
                assert_eq!(success.card_brand, CardBrand::Visa);
                assert_eq!(success.card_last4, "4242");
                assert!(success.transaction_id.starts_with("txn_"));
            }
            ChargeResult::Declined(d) => panic!("expected approval, got decline: {}", d.message),
        }
    }

    #[tokio::test]
    async fn test_canonical_declined_card() {
        let result = gateway()
            .charge(&card("4000000000000002", 12, 2099, "123"))
            .await
            .unwrap();

        match result {
            ChargeResult::Declined(decline) => {
                assert_eq!(decline.card_brand, CardBrand::Visa);
                assert_eq!(decline.message, "Your card was declined");
            }
            ChargeResult::Approved(_) => panic!("expected decline"),
        }
    }

    #[tokio::test]
    async fn test_canonical_insufficient_funds_card() {
        let result = gateway()
            .charge(&card("4000000000009995", 12, 2099, "123"))
            .await
            .unwrap();

        match result {
            ChargeResult::Declined(decline) => {
                assert_eq!(decline.message, "Insufficient funds");
            }
            ChargeResult::Approved(_) => panic!("expected decline"),
        }
    }

    #[tokio::test]
    async fn test_malformed_input_fails_before_charge() {
        let gw = gateway();

        // Bad checksum
        assert!(gw.charge(&card("4242424242424241", 12, 2099, "123")).await.is_err());
        // Too short
        assert!(gw.charge(&card("424242424242", 12, 2099, "123")).await.is_err());
        // Expired
        assert!(gw.charge(&card("4242424242424242", 1, 2020, "123")).await.is_err());
        // Wrong CVV length
        assert!(gw.charge(&card("4242424242424242", 12, 2099, "12345")).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_valid_card_resolves_deterministically_at_extremes() {
        // success_rate 1.0 always approves, 0.0 always declines
        let always = GatewayService::with_settings(0, 1.0);
        let never = GatewayService::with_settings(0, 0.0);
        let details = card("5555555555554444", 12, 2099, "123");

        for _ in 0..10 {
            assert!(matches!(
                always.charge(&details).await.unwrap(),
                ChargeResult::Approved(_)
            ));
            assert!(matches!(
                never.charge(&details).await.unwrap(),
                ChargeResult::Declined(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_canonical_expired_card() {
        let result = gateway()
            .charge(&card("4000000000000069", 12, 2099, "123"))
            .await
            .unwrap();

        match result {
            ChargeResult::Declined(decline) => {
                assert_eq!(decline.message, "Your card has expired");
            }
            ChargeResult::Approved(_) => panic!("expected decline"),
        }
    }

    #[tokio::test]
    async fn test_refund_returns_synthetic_id() {
        let refund_id = gateway().refund("txn_abc").await.unwrap();
        assert!(refund_id.starts_with("re_"));
    }

    #[tokio::test]
    async fn test_card_number_whitespace_is_ignored() {
        let result = gateway()
            .charge(&card("4242 4242 4242 4242", 12, 2099, "123"))
            .await
            .unwrap();
        assert!(matches!(result, ChargeResult::Approved(_)));
    }
}
