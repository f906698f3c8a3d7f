use sea_orm_migration::prelude::*;

use sesame_credentials_migration::Migrator;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
