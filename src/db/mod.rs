use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};
use rocket::fairing::AdHoc;

pub fn init() -> AdHoc {
    AdHoc::on_ignite("MongoDB", |rocket| async {
        match connect().await {
            Ok(database) => {
                info!("✓ MongoDB connected successfully");
                if let Err(e) = ensure_indexes(&database).await {
                    warn!("Index creation failed: {}", e);
                }
                rocket.manage(database)
            }
            Err(e) => {
                error!("✗ Failed to connect to MongoDB: {}", e);
                rocket
            }
        }
    })
}

async fn connect() -> Result<Database, mongodb::error::Error> {
    let uri = crate::config::Config::mongodb_uri();
    let client = Client::with_uri_str(&uri).await?;

    // Test connection
    client
        .database("admin")
        .run_command(doc! {"ping": 1}, None)
        .await?;

    Ok(client.database(&crate::config::Config::database_name()))
}

/// Unique keys the handlers rely on for duplicate detection.
async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let unique = || IndexOptions::builder().unique(true).build();

    db.collection::<mongodb::bson::Document>("users")
        .create_index(IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>("wallets")
        .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).options(unique()).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>("availability")
        .create_index(IndexModel::builder().keys(doc! { "achiever_id": 1 }).options(unique()).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>("follows")
        .create_index(
            IndexModel::builder()
                .keys(doc! { "follower_id": 1, "achiever_id": 1 })
                .options(unique())
                .build(),
            None,
        )
        .await?;
    db.collection::<mongodb::bson::Document>("payment_orders")
        .create_index(IndexModel::builder().keys(doc! { "order_id": 1 }).options(unique()).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>("bookings")
        .create_index(IndexModel::builder().keys(doc! { "achiever_id": 1, "date": 1 }).build(), None)
        .await?;

    Ok(())
}

/// Whether an insert failed on a unique index.
pub fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(w)) if w.code == 11000
    )
}

pub type DbConn = Database;
