use upg_common::Paisa;

use crate::{
    db_types::{MerchantProfile, NewMerchant},
    sqlite::db::merchants,
    SqliteDatabase,
};

/// A merchant with a UPI handle and sensible bounds: deposits ₹5.00 - ₹3,000.00, withdrawals
/// ₹10.00 - ₹10,000.00.
pub fn test_merchant(id: &str) -> NewMerchant {
    NewMerchant {
        id: id.to_string(),
        name: format!("Merchant {id}"),
        webhook_secret: format!("secret-{id}"),
        callback_url: Some(format!("https://{id}.example.com/webhook")),
        upi_id: Some(format!("{id}@okaxis")),
        upi_name: Some(format!("Merchant {id}")),
        min_deposit: Paisa::from(500),
        max_deposit: Paisa::from(300_000),
        min_withdrawal: Paisa::from(1000),
        max_withdrawal: Paisa::from(1_000_000),
    }
}

pub async fn seed_merchant(db: &SqliteDatabase, merchant: NewMerchant) -> MerchantProfile {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    merchants::insert_merchant(merchant, &mut conn).await.expect("Error seeding merchant")
}
