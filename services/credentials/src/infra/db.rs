use anyhow::Context as _;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter,
};

use sesame_credentials_schema::{otps, sessions};

use crate::domain::store::{DocumentStore, OtpFilter, OtpPatch, SessionFilter, SessionPatch};
use crate::domain::types::{Otp, Session};
use crate::error::CredentialError;

// ── OTP documents ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOtpStore {
    pub db: DatabaseConnection,
}

fn otp_condition(filter: &OtpFilter) -> Condition {
    match filter {
        OtpFilter::Key { email, purpose } => Condition::all()
            .add(otps::Column::Email.eq(email.as_str()))
            .add(otps::Column::Purpose.eq(purpose.as_str())),
        OtpFilter::Id(id) => Condition::all().add(otps::Column::Id.eq(*id)),
        OtpFilter::ExpiredAt(at) => Condition::all().add(otps::Column::ExpiresAt.lte(*at)),
    }
}

impl DocumentStore for DbOtpStore {
    type Document = Otp;
    type Filter = OtpFilter;
    type Patch = OtpPatch;

    async fn create(&self, otp: &Otp) -> Result<(), CredentialError> {
        let attempts =
            i32::try_from(otp.attempts).map_err(|e| CredentialError::corrupt("otp attempts", e))?;
        otps::ActiveModel {
            id: Set(otp.id),
            email: Set(otp.email.clone()),
            purpose: Set(otp.purpose.as_str().to_owned()),
            code: Set(otp.code.clone()),
            attempts: Set(attempts),
            created_at: Set(otp.created_at),
            updated_at: Set(otp.updated_at),
            expires_at: Set(otp.expires_at),
        }
        .insert(&self.db)
        .await
        .context("create otp")?;
        Ok(())
    }

    async fn find_one(&self, filter: &OtpFilter) -> Result<Option<Otp>, CredentialError> {
        let model = otps::Entity::find()
            .filter(otp_condition(filter))
            .one(&self.db)
            .await
            .context("find otp")?;
        model.map(otp_from_model).transpose()
    }

    async fn find(&self, filter: &OtpFilter) -> Result<Vec<Otp>, CredentialError> {
        let models = otps::Entity::find()
            .filter(otp_condition(filter))
            .all(&self.db)
            .await
            .context("list otps")?;
        models.into_iter().map(otp_from_model).collect()
    }

    async fn update(&self, filter: &OtpFilter, patch: &OtpPatch) -> Result<u64, CredentialError> {
        let OtpPatch::IncrementAttempts { updated_at } = patch;
        let result = otps::Entity::update_many()
            .col_expr(
                otps::Column::Attempts,
                Expr::col(otps::Column::Attempts).add(1),
            )
            .col_expr(otps::Column::UpdatedAt, Expr::value(*updated_at))
            .filter(otp_condition(filter))
            .exec(&self.db)
            .await
            .context("increment otp attempts")?;
        Ok(result.rows_affected)
    }

    async fn delete(&self, filter: &OtpFilter) -> Result<u64, CredentialError> {
        let result = otps::Entity::delete_many()
            .filter(otp_condition(filter))
            .exec(&self.db)
            .await
            .context("delete otp")?;
        Ok(result.rows_affected)
    }
}

fn otp_from_model(model: otps::Model) -> Result<Otp, CredentialError> {
    Ok(Otp {
        id: model.id,
        email: model.email,
        purpose: model.purpose.parse()?,
        code: model.code,
        attempts: i64::from(model.attempts),
        created_at: model.created_at,
        updated_at: model.updated_at,
        expires_at: model.expires_at,
    })
}

// ── Session documents ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbSessionStore {
    pub db: DatabaseConnection,
}

fn session_condition(filter: &SessionFilter) -> Condition {
    match filter {
        SessionFilter::ActiveTokenHash(hash) => Condition::all()
            .add(sessions::Column::TokenHash.eq(hash.as_str()))
            .add(sessions::Column::IsActive.eq(true)),
        SessionFilter::ActiveForAccount(account_id) => Condition::all()
            .add(sessions::Column::AccountId.eq(account_id.as_str()))
            .add(sessions::Column::IsActive.eq(true)),
        SessionFilter::Stale(at) => Condition::any()
            .add(sessions::Column::ExpiresAt.lte(*at))
            .add(sessions::Column::IsActive.eq(false)),
    }
}

impl DocumentStore for DbSessionStore {
    type Document = Session;
    type Filter = SessionFilter;
    type Patch = SessionPatch;

    async fn create(&self, session: &Session) -> Result<(), CredentialError> {
        let model = sessions::ActiveModel {
            id: Set(session.id),
            account_id: Set(session.account_id.clone()),
            token_hash: Set(session.token_hash.clone()),
            is_active: Set(session.is_active),
            expires_at: Set(session.expires_at),
            created_at: Set(session.created_at),
            last_used_at: Set(session.last_used_at),
            user_agent: Set(session.user_agent.clone()),
            ip_address: Set(session.ip_address.clone()),
        };
        let inserted = sessions::Entity::insert(model)
            .on_conflict(
                OnConflict::column(sessions::Column::TokenHash)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("create session")?;
        if inserted == 0 {
            return Err(CredentialError::TokenAlreadyExists);
        }
        Ok(())
    }

    async fn find_one(&self, filter: &SessionFilter) -> Result<Option<Session>, CredentialError> {
        let model = sessions::Entity::find()
            .filter(session_condition(filter))
            .one(&self.db)
            .await
            .context("find session")?;
        Ok(model.map(session_from_model))
    }

    async fn find(&self, filter: &SessionFilter) -> Result<Vec<Session>, CredentialError> {
        let models = sessions::Entity::find()
            .filter(session_condition(filter))
            .all(&self.db)
            .await
            .context("list sessions")?;
        Ok(models.into_iter().map(session_from_model).collect())
    }

    async fn update(
        &self,
        filter: &SessionFilter,
        patch: &SessionPatch,
    ) -> Result<u64, CredentialError> {
        let update = match patch {
            SessionPatch::Touch { last_used_at } => sessions::Entity::update_many()
                .col_expr(sessions::Column::LastUsedAt, Expr::value(*last_used_at)),
            SessionPatch::Deactivate => sessions::Entity::update_many()
                .col_expr(sessions::Column::IsActive, Expr::value(false)),
        };
        let result = update
            .filter(session_condition(filter))
            .exec(&self.db)
            .await
            .context("update session")?;
        Ok(result.rows_affected)
    }

    async fn delete(&self, filter: &SessionFilter) -> Result<u64, CredentialError> {
        let result = sessions::Entity::delete_many()
            .filter(session_condition(filter))
            .exec(&self.db)
            .await
            .context("delete sessions")?;
        Ok(result.rows_affected)
    }
}

fn session_from_model(model: sessions::Model) -> Session {
    Session {
        id: model.id,
        account_id: model.account_id,
        token_hash: model.token_hash,
        is_active: model.is_active,
        expires_at: model.expires_at,
        created_at: model.created_at,
        last_used_at: model.last_used_at,
        user_agent: model.user_agent,
        ip_address: model.ip_address,
    }
}
