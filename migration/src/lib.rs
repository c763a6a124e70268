pub use sea_orm_migration::prelude::*;

mod m20251001_000001_create_ledger;
mod m20251001_000002_create_draws_and_limits;
mod m20251001_000003_create_tickets;
mod m20251001_000004_seed_limits_and_prizes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251001_000001_create_ledger::Migration),
            Box::new(m20251001_000002_create_draws_and_limits::Migration),
            Box::new(m20251001_000003_create_tickets::Migration),
            Box::new(m20251001_000004_seed_limits_and_prizes::Migration),
        ]
    }
}
