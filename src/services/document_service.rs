use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Lease, Payment, Property, User};
use crate::services::FileService;

/// Renders lease agreements and payment receipts to HTML and persists
/// them in object storage. Callers treat generation as best-effort: a
/// missing document is regenerated on the next request for it.
pub struct DocumentService {
    config: Config,
}

impl DocumentService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn generate_lease_document(&self, pool: &PgPool, lease_id: Uuid) -> AppResult<String> {
        let lease = sqlx::query_as::<_, Lease>("SELECT * FROM leases WHERE id = $1")
            .bind(lease_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Lease not found".to_string()))?;

        let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
            .bind(lease.property_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Property not found".to_string()))?;

        let landlord = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(lease.landlord_id)
            .fetch_one(pool)
            .await?;

        let tenant = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(lease.tenant_id)
            .fetch_one(pool)
            .await?;

        let verify_url = format!("{}/api/v1/leases/{}", self.config.app_base_url, lease.id);
        let qr = generate_qr_code_base64(&verify_url)?;

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Lease Agreement</title></head>
<body>
<h1>Residential Lease Agreement</h1>
<p><b>Property:</b> {title}, {street}, {city}</p>
<p><b>Landlord:</b> {landlord_first} {landlord_last}</p>
<p><b>Tenant:</b> {tenant_first} {tenant_last}</p>
<p><b>Term:</b> {start} to {end}</p>
<p><b>Monthly rent:</b> {rent} (due on day {due_day})</p>
<p><b>Security deposit:</b> {deposit}</p>
<h2>Terms</h2>
<p>{terms}</p>
<h2>Signatures</h2>
<table>
<tr><td><img src="{landlord_sig}" alt="Landlord signature" width="240"/></td>
    <td><img src="{tenant_sig}" alt="Tenant signature" width="240"/></td></tr>
<tr><td>Landlord, signed {landlord_signed_at}</td>
    <td>Tenant, signed {tenant_signed_at}</td></tr>
</table>
<p><img src="{qr}" alt="Verification QR" width="120"/></p>
</body>
</html>"#,
            title = property.title,
            street = property.street,
            city = property.city,
            landlord_first = landlord.first_name,
            landlord_last = landlord.last_name,
            tenant_first = tenant.first_name,
            tenant_last = tenant.last_name,
            start = lease.start_date,
            end = lease.end_date,
            rent = lease.rent_amount,
            due_day = lease.payment_due_day,
            deposit = lease.deposit_amount,
            terms = lease.terms.as_deref().unwrap_or("Standard residential terms apply."),
            landlord_sig = lease.landlord_signature_data.as_deref().unwrap_or(""),
            tenant_sig = lease.tenant_signature_data.as_deref().unwrap_or(""),
            landlord_signed_at = lease
                .landlord_signed_at
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            tenant_signed_at = lease
                .tenant_signed_at
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            qr = qr,
        );

        let file_service = FileService::new(&self.config).await?;
        let url = file_service
            .upload_file(
                "lease-documents",
                &format!("lease-{}.html", lease.id),
                "text/html",
                html.into_bytes(),
            )
            .await?;

        sqlx::query("UPDATE leases SET document_url = $1, updated_at = NOW() WHERE id = $2")
            .bind(&url)
            .bind(lease.id)
            .execute(pool)
            .await?;

        Ok(url)
    }

    pub async fn generate_receipt_document(
        &self,
        pool: &PgPool,
        payment_id: Uuid,
    ) -> AppResult<String> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        let receipt_number = payment
            .receipt_number
            .clone()
            .ok_or_else(|| AppError::Conflict("Payment has no receipt number".to_string()))?;

        let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
            .bind(payment.property_id)
            .fetch_one(pool)
            .await?;

        let tenant = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(payment.tenant_id)
            .fetch_one(pool)
            .await?;

        let verify_url = format!(
            "{}/api/v1/payments/{}/receipt",
            self.config.app_base_url, payment.id
        );
        let qr = generate_qr_code_base64(&verify_url)?;

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Receipt {receipt}</title></head>
<body>
<h1>Payment Receipt</h1>
<p><b>Receipt number:</b> {receipt}</p>
<p><b>Property:</b> {title}, {street}, {city}</p>
<p><b>Paid by:</b> {tenant_first} {tenant_last}</p>
<p><b>Amount:</b> {amount}</p>
<p><b>Paid on:</b> {paid_date}</p>
<p><b>Card:</b> {brand} ending in {last4}</p>
<p><b>Transaction:</b> {txn}</p>
<p><img src="{qr}" alt="Verification QR" width="120"/></p>
</body>
</html>"#,
            receipt = receipt_number,
            title = property.title,
            street = property.street,
            city = property.city,
            tenant_first = tenant.first_name,
            tenant_last = tenant.last_name,
            amount = payment.amount,
            paid_date = payment
                .paid_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            brand = payment.card_brand.as_deref().unwrap_or("-"),
            last4 = payment.card_last4.as_deref().unwrap_or("-"),
            txn = payment.transaction_id.as_deref().unwrap_or("-"),
            qr = qr,
        );

        let file_service = FileService::new(&self.config).await?;
        let url = file_service
            .upload_file(
                "receipts",
                &format!("receipt-{}.html", payment.id),
                "text/html",
                html.into_bytes(),
            )
            .await?;

        sqlx::query("UPDATE payments SET receipt_url = $1, updated_at = NOW() WHERE id = $2")
            .bind(&url)
            .bind(payment.id)
            .execute(pool)
            .await?;

        Ok(url)
    }
}

// QR code generation for document verification links
pub fn generate_qr_code(data: &str) -> AppResult<Vec<u8>> {
    use image::Luma;
    use qrcode::QrCode;

    let code = QrCode::new(data.as_bytes()).map_err(|e| AppError::Internal(e.to_string()))?;

    let image = code.render::<Luma<u8>>().build();

    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(buffer.into_inner())
}

pub fn generate_qr_code_base64(data: &str) -> AppResult<String> {
    let png_data = generate_qr_code(data)?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &png_data)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_code_is_png() {
        let png = generate_qr_code("https://example.com/receipt/1").unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_qr_code_base64_data_url() {
        let data_url = generate_qr_code_base64("hello").unwrap();
        assert!(data_url.starts_with("data:image/png;base64,"));
    }
}
