use crate::config::Config;
use crate::error::{AppError, AppResult};
use serde::Serialize;

/// Transactional email notifier. With no transport configured the
/// service logs and returns Ok, so notification failures can never
/// break the operation that triggered them.
pub struct EmailService {
    config: Config,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmailRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    html: String,
}

impl EmailService {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub async fn send_receipt(
        &self,
        to: &str,
        receipt_number: &str,
        amount: &str,
        property_title: &str,
    ) -> AppResult<()> {
        if !self.config.email_enabled {
            tracing::info!("Email disabled. Receipt {} for {}", receipt_number, to);
            return Ok(());
        }

        let subject = format!("Payment receipt {}", receipt_number);
        let html = format!(
            "<p>Your payment of {} for <b>{}</b> was received.</p>\
             <p>Receipt number: <b>{}</b></p>",
            amount, property_title, receipt_number
        );
        self.send_email(to, &subject, &html).await
    }

    pub async fn send_lease_activated(
        &self,
        to: &str,
        property_title: &str,
        start_date: &str,
        end_date: &str,
    ) -> AppResult<()> {
        if !self.config.email_enabled {
            tracing::info!("Email disabled. Lease activation notice for {}", to);
            return Ok(());
        }

        let subject = format!("Lease signed: {}", property_title);
        let html = format!(
            "<p>Both parties have signed the lease for <b>{}</b>.</p>\
             <p>Term: {} to {}.</p>",
            property_title, start_date, end_date
        );
        self.send_email(to, &subject, &html).await
    }

    pub async fn send_maintenance_notice(
        &self,
        to: &str,
        property_title: &str,
        request_title: &str,
    ) -> AppResult<()> {
        if !self.config.email_enabled {
            tracing::info!("Email disabled. Maintenance notice for {}", to);
            return Ok(());
        }

        let subject = format!("New maintenance request: {}", property_title);
        let html = format!(
            "<p>A new maintenance request was filed for <b>{}</b>:</p><p>{}</p>",
            property_title, request_title
        );
        self.send_email(to, &subject, &html).await
    }

    async fn send_email(&self, to: &str, subject: &str, html: &str) -> AppResult<()> {
        let request = EmailRequest {
            from: self.config.email_sender.clone(),
            to: vec![to.to_string()],
            subject: subject.to_string(),
            html: html.to_string(),
        };

        let response = self
            .client
            .post(&self.config.email_api_url)
            .bearer_auth(&self.config.email_api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Email(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Email API error: {} - {}", status, body);
            return Err(AppError::Email(format!("Email API error: {}", status)));
        }

        tracing::info!("Email sent to {}", to);
        Ok(())
    }
}
