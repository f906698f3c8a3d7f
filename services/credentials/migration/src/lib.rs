use sea_orm_migration::prelude::*;

mod m20261001_000001_create_otps;
mod m20261001_000002_create_sessions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_otps::Migration),
            Box::new(m20261001_000002_create_sessions::Migration),
        ]
    }
}
