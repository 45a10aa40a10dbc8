use chrono::NaiveDate;

use crate::error::Result;
use crate::store::delete_visits;

use super::open_store;

pub fn run(customer: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<()> {
    let (_, conn) = open_store()?;
    let deleted = delete_visits(&conn, customer, from, to)?;
    tracing::info!("Deleted {} visit(s) of {}", deleted, customer);
    println!("Deleted {deleted} visit(s) for customer {customer}");
    Ok(())
}
