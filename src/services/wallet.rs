use log::info;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime};

use crate::db::DbConn;
use crate::models::{TransactionType, Wallet, WalletTransaction};
use crate::services::billing::format_rupees;
use crate::utils::ApiError;

pub struct WalletService;

impl WalletService {
    /// Returns the user's wallet, creating an empty one on first access.
    pub async fn ensure(db: &DbConn, user_id: ObjectId) -> Result<Wallet, ApiError> {
        let wallets = db.collection::<Wallet>("wallets");

        if let Some(wallet) = wallets.find_one(doc! { "user_id": user_id }, None).await? {
            return Ok(wallet);
        }

        let mut wallet = Wallet::new(user_id);
        match wallets.insert_one(&wallet, None).await {
            Ok(res) => {
                wallet.id = res.inserted_id.as_object_id();
                Ok(wallet)
            }
            // Lost a creation race against another request; the unique index kept one.
            Err(_) => wallets
                .find_one(doc! { "user_id": user_id }, None)
                .await?
                .ok_or_else(|| ApiError::internal_error("Failed to create wallet")),
        }
    }

    pub async fn credit(db: &DbConn, user_id: ObjectId, tx: WalletTransaction) -> Result<(), ApiError> {
        debug_assert_eq!(tx.kind, TransactionType::Credit);
        Self::ensure(db, user_id).await?;

        let amount = tx.amount;
        let entry = to_bson(&tx).map_err(|e| ApiError::internal_error(e.to_string()))?;

        db.collection::<Wallet>("wallets")
            .update_one(
                doc! { "user_id": user_id },
                doc! {
                    "$inc": { "balance": amount },
                    "$push": { "transactions": entry },
                    "$set": { "updated_at": DateTime::now() }
                },
                None,
            )
            .await?;

        info!("Wallet {} credited {} ({:?})", user_id, format_rupees(amount), tx.category);
        Ok(())
    }

    /// Credits the wallet unless its ledger already holds an entry with the
    /// same category and reference. Returns whether this call applied it, so
    /// a failed settlement can simply be run again.
    pub async fn credit_once(db: &DbConn, user_id: ObjectId, tx: WalletTransaction) -> Result<bool, ApiError> {
        debug_assert_eq!(tx.kind, TransactionType::Credit);
        let reference = tx
            .reference
            .clone()
            .ok_or_else(|| ApiError::internal_error("Idempotent credit needs a reference"))?;
        Self::ensure(db, user_id).await?;

        let amount = tx.amount;
        let category = to_bson(&tx.category).map_err(|e| ApiError::internal_error(e.to_string()))?;
        let entry = to_bson(&tx).map_err(|e| ApiError::internal_error(e.to_string()))?;

        let result = db
            .collection::<Wallet>("wallets")
            .update_one(
                doc! {
                    "user_id": user_id,
                    "transactions": {
                        "$not": { "$elemMatch": { "category": category, "reference": &reference } }
                    }
                },
                doc! {
                    "$inc": { "balance": amount },
                    "$push": { "transactions": entry },
                    "$set": { "updated_at": DateTime::now() }
                },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Ok(false);
        }

        info!("Wallet {} credited {} ({:?} {})", user_id, format_rupees(amount), tx.category, reference);
        Ok(true)
    }

    /// Debits the wallet only if the balance covers the amount.
    pub async fn debit(db: &DbConn, user_id: ObjectId, tx: WalletTransaction) -> Result<(), ApiError> {
        debug_assert_eq!(tx.kind, TransactionType::Debit);
        Self::ensure(db, user_id).await?;

        let amount = tx.amount;
        let entry = to_bson(&tx).map_err(|e| ApiError::internal_error(e.to_string()))?;

        let result = db
            .collection::<Wallet>("wallets")
            .update_one(
                doc! { "user_id": user_id, "balance": { "$gte": amount } },
                doc! {
                    "$inc": { "balance": -amount },
                    "$push": { "transactions": entry },
                    "$set": { "updated_at": DateTime::now() }
                },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(ApiError::bad_request("Insufficient wallet balance"));
        }

        info!("Wallet {} debited {} ({:?})", user_id, format_rupees(amount), tx.category);
        Ok(())
    }
}
