use crate::db::DbPool;
use crate::models::{InquiryStatus, ServiceInquiry};
use crate::schema::service_inquiries;
use anyhow::Result;
use diesel::prelude::*;
use tracing::{info, instrument};

#[instrument(skip_all, fields(source = %inquiry.source))]
pub fn create_inquiry(pool: &DbPool, inquiry: ServiceInquiry) -> Result<ServiceInquiry> {
    let conn = &mut pool.get()?;
    diesel::insert_into(service_inquiries::table)
        .values(&inquiry)
        .execute(conn)?;
    info!("Recorded inquiry {} from {}", inquiry.id, inquiry.email);
    Ok(inquiry)
}

/// Lists inquiries newest first, optionally only those in `status`
pub fn list_inquiries(pool: &DbPool, status: Option<InquiryStatus>) -> Result<Vec<ServiceInquiry>> {
    let conn = &mut pool.get()?;
    let mut query = service_inquiries::table.into_boxed();
    if let Some(status) = status {
        query = query.filter(service_inquiries::status.eq(status));
    }
    let result = query
        .order(service_inquiries::created_at.desc())
        .load::<ServiceInquiry>(conn)?;
    Ok(result)
}

pub fn update_inquiry_status(pool: &DbPool, inquiry_id: &str, status: InquiryStatus) -> Result<Option<ServiceInquiry>> {
    let conn = &mut pool.get()?;
    let updated = diesel::update(service_inquiries::table.find(inquiry_id))
        .set(service_inquiries::status.eq(status))
        .execute(conn)?;
    if updated == 0 {
        return Ok(None);
    }
    info!("Inquiry {} is now {}", inquiry_id, status);
    let inquiry = service_inquiries::table
        .find(inquiry_id)
        .first::<ServiceInquiry>(conn)
        .optional()?;
    Ok(inquiry)
}

pub fn count_inquiries(pool: &DbPool, status: InquiryStatus) -> Result<i64> {
    let conn = &mut pool.get()?;
    let count = service_inquiries::table
        .filter(service_inquiries::status.eq(status))
        .count()
        .get_result(conn)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[test]
    fn test_inquiry_lifecycle() {
        let pool = setup_test_db();
        let inquiry = create_inquiry(
            &pool,
            ServiceInquiry::new(
                "Dana".to_string(),
                "dana@shop.test".to_string(),
                "Need a new storefront".to_string(),
                "website".to_string(),
            ),
        )
        .unwrap();

        assert_eq!(count_inquiries(&pool, InquiryStatus::New).unwrap(), 1);

        let contacted = update_inquiry_status(&pool, &inquiry.id, InquiryStatus::Contacted).unwrap().unwrap();
        assert_eq!(contacted.status, InquiryStatus::Contacted);
        assert_eq!(count_inquiries(&pool, InquiryStatus::New).unwrap(), 0);
        assert_eq!(list_inquiries(&pool, Some(InquiryStatus::Contacted)).unwrap().len(), 1);
        assert!(update_inquiry_status(&pool, "missing", InquiryStatus::Closed).unwrap().is_none());
    }
}
