// ABOUTME: SQLite implementation of every store trait using sqlx
// ABOUTME: Single-statement DELETE ... RETURNING gives atomic single-use redemption
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Timestamps are stored as Unix milliseconds so expiry comparisons happen
//! numerically inside SQLite. List-valued columns hold JSON arrays.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{
    AuthorizationCode, Fingerprint, FlowSession, OAuth2Client, RefreshTokenRecord, SsoSession,
    User, UserConsent,
};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use super::{
    AuthorizationCodeStore, ClientStore, ConsentStore, FlowSessionStore, RefreshTokenStore,
    SsoSessionStore, UserStore,
};

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(value: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| AppError::database(format!("Timestamp out of range: {value}")))
}

fn opt_from_millis(value: Option<i64>) -> AppResult<Option<DateTime<Utc>>> {
    value.map(from_millis).transpose()
}

fn parse_uuid(value: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::database(format!("Invalid UUID {value}: {e}")))
}

fn to_json_list(values: &[String]) -> AppResult<String> {
    Ok(serde_json::to_string(values)?)
}

fn from_json_list(value: &str) -> AppResult<Vec<String>> {
    Ok(serde_json::from_str(value)?)
}

/// Map a unique-constraint violation to `ResourceAlreadyExists`
fn conflict_as_exists(err: sqlx::Error, resource: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::already_exists(resource),
        _ => AppError::from(err),
    }
}

impl SqliteStore {
    /// Connect and run migrations
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrated
    pub async fn connect(connection_string: &str) -> AppResult<Self> {
        // In-memory databases are per connection; keep exactly one
        let max_connections = if connection_string.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(connection_string)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!("SQLite store ready");
        Ok(store)
    }

    /// Create tables if missing
    ///
    /// # Errors
    /// Returns error if a DDL statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        let statements = [
            r"
            CREATE TABLE IF NOT EXISTS oauth2_clients (
                client_id TEXT PRIMARY KEY,
                client_secret_hash TEXT NOT NULL,
                redirect_uris TEXT NOT NULL,
                post_logout_redirect_uris TEXT NOT NULL,
                grant_types TEXT NOT NULL,
                response_types TEXT NOT NULL,
                client_name TEXT,
                client_uri TEXT,
                scope TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                email_verified BOOLEAN NOT NULL DEFAULT false,
                password_hash TEXT NOT NULL,
                display_name TEXT,
                given_name TEXT,
                family_name TEXT,
                picture TEXT,
                phone_number TEXT,
                phone_number_verified BOOLEAN NOT NULL DEFAULT false,
                address TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS oauth2_auth_codes (
                code TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL,
                nonce TEXT,
                code_challenge TEXT,
                code_challenge_method TEXT,
                auth_time INTEGER NOT NULL,
                sso_session_id TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS oauth2_flow_sessions (
                session_id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL,
                state TEXT,
                response_type TEXT NOT NULL,
                nonce TEXT,
                code_challenge TEXT,
                code_challenge_method TEXT,
                force_consent BOOLEAN NOT NULL DEFAULT false,
                authenticated BOOLEAN NOT NULL DEFAULT false,
                user_id TEXT,
                auth_time INTEGER,
                sso_session_id TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS sso_sessions (
                session_id TEXT PRIMARY KEY,
                handle TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                authenticated BOOLEAN NOT NULL,
                created_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                ip_address TEXT,
                user_agent TEXT
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_sso_sessions_user ON sso_sessions(user_id)",
            r"
            CREATE TABLE IF NOT EXISTS user_consents (
                user_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                scopes TEXT NOT NULL,
                granted_at INTEGER NOT NULL,
                expires_at INTEGER,
                PRIMARY KEY (user_id, client_id)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS oauth2_refresh_tokens (
                jti TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                issued_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_pair ON oauth2_refresh_tokens(user_id, client_id)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn row_to_client(row: &SqliteRow) -> AppResult<OAuth2Client> {
        Ok(OAuth2Client {
            client_id: row.try_get("client_id")?,
            client_secret_hash: row.try_get("client_secret_hash")?,
            redirect_uris: from_json_list(&row.try_get::<String, _>("redirect_uris")?)?,
            post_logout_redirect_uris: from_json_list(
                &row.try_get::<String, _>("post_logout_redirect_uris")?,
            )?,
            grant_types: from_json_list(&row.try_get::<String, _>("grant_types")?)?,
            response_types: from_json_list(&row.try_get::<String, _>("response_types")?)?,
            client_name: row.try_get("client_name")?,
            client_uri: row.try_get("client_uri")?,
            scope: row.try_get("scope")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            expires_at: opt_from_millis(row.try_get("expires_at")?)?,
        })
    }

    fn row_to_user(row: &SqliteRow) -> AppResult<User> {
        Ok(User {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            email: row.try_get("email")?,
            email_verified: row.try_get("email_verified")?,
            password_hash: row.try_get("password_hash")?,
            display_name: row.try_get("display_name")?,
            given_name: row.try_get("given_name")?,
            family_name: row.try_get("family_name")?,
            picture: row.try_get("picture")?,
            phone_number: row.try_get("phone_number")?,
            phone_number_verified: row.try_get("phone_number_verified")?,
            address: row.try_get("address")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
        })
    }

    fn row_to_code(row: &SqliteRow) -> AppResult<AuthorizationCode> {
        Ok(AuthorizationCode {
            code: row.try_get("code")?,
            client_id: row.try_get("client_id")?,
            user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
            redirect_uri: row.try_get("redirect_uri")?,
            scope: row.try_get("scope")?,
            nonce: row.try_get("nonce")?,
            code_challenge: row.try_get("code_challenge")?,
            code_challenge_method: row.try_get("code_challenge_method")?,
            auth_time: from_millis(row.try_get("auth_time")?)?,
            sso_session_id: row.try_get("sso_session_id")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            expires_at: from_millis(row.try_get("expires_at")?)?,
        })
    }

    fn row_to_flow(row: &SqliteRow) -> AppResult<FlowSession> {
        let user_id: Option<String> = row.try_get("user_id")?;
        Ok(FlowSession {
            session_id: row.try_get("session_id")?,
            client_id: row.try_get("client_id")?,
            redirect_uri: row.try_get("redirect_uri")?,
            scope: row.try_get("scope")?,
            state: row.try_get("state")?,
            response_type: row.try_get("response_type")?,
            nonce: row.try_get("nonce")?,
            code_challenge: row.try_get("code_challenge")?,
            code_challenge_method: row.try_get("code_challenge_method")?,
            force_consent: row.try_get("force_consent")?,
            authenticated: row.try_get("authenticated")?,
            user_id: user_id.as_deref().map(parse_uuid).transpose()?,
            auth_time: opt_from_millis(row.try_get("auth_time")?)?,
            sso_session_id: row.try_get("sso_session_id")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            expires_at: from_millis(row.try_get("expires_at")?)?,
        })
    }

    fn row_to_session(row: &SqliteRow) -> AppResult<SsoSession> {
        Ok(SsoSession {
            session_id: row.try_get("session_id")?,
            handle: row.try_get("handle")?,
            user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
            authenticated: row.try_get("authenticated")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            last_activity: from_millis(row.try_get("last_activity")?)?,
            expires_at: from_millis(row.try_get("expires_at")?)?,
            fingerprint: Fingerprint::new(row.try_get("ip_address")?, row.try_get("user_agent")?),
        })
    }

    async fn widen_consent_locked(
        conn: &mut SqliteConnection,
        consent: &UserConsent,
    ) -> AppResult<UserConsent> {
        let existing = sqlx::query("SELECT * FROM user_consents WHERE user_id = ?1 AND client_id = ?2")
            .bind(consent.user_id.to_string())
            .bind(&consent.client_id)
            .fetch_optional(&mut *conn)
            .await?
            .as_ref()
            .map(Self::row_to_consent)
            .transpose()?;
        let stored = existing.map_or_else(|| consent.clone(), |current| current.widened_by(consent));

        sqlx::query(
            r"
            INSERT INTO user_consents (user_id, client_id, scopes, granted_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (user_id, client_id) DO UPDATE SET
                scopes = excluded.scopes,
                granted_at = excluded.granted_at,
                expires_at = excluded.expires_at
            ",
        )
        .bind(stored.user_id.to_string())
        .bind(&stored.client_id)
        .bind(to_json_list(&stored.scopes)?)
        .bind(millis(stored.granted_at))
        .bind(stored.expires_at.map(millis))
        .execute(&mut *conn)
        .await?;
        Ok(stored)
    }

    fn row_to_consent(row: &SqliteRow) -> AppResult<UserConsent> {
        Ok(UserConsent {
            user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
            client_id: row.try_get("client_id")?,
            scopes: from_json_list(&row.try_get::<String, _>("scopes")?)?,
            granted_at: from_millis(row.try_get("granted_at")?)?,
            expires_at: opt_from_millis(row.try_get("expires_at")?)?,
        })
    }

    fn row_to_refresh(row: &SqliteRow) -> AppResult<RefreshTokenRecord> {
        Ok(RefreshTokenRecord {
            jti: row.try_get("jti")?,
            user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
            client_id: row.try_get("client_id")?,
            scope: row.try_get("scope")?,
            issued_at: from_millis(row.try_get("issued_at")?)?,
            expires_at: from_millis(row.try_get("expires_at")?)?,
        })
    }

    async fn delete_expired_from(&self, table: &str, now: DateTime<Utc>) -> AppResult<u64> {
        let query = format!("DELETE FROM {table} WHERE expires_at <= ?1");
        let result = sqlx::query(&query)
            .bind(millis(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ClientStore for SqliteStore {
    async fn create_client(&self, client: &OAuth2Client) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_clients (
                client_id, client_secret_hash, redirect_uris, post_logout_redirect_uris,
                grant_types, response_types, client_name, client_uri, scope,
                created_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
        )
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(to_json_list(&client.redirect_uris)?)
        .bind(to_json_list(&client.post_logout_redirect_uris)?)
        .bind(to_json_list(&client.grant_types)?)
        .bind(to_json_list(&client.response_types)?)
        .bind(&client.client_name)
        .bind(&client.client_uri)
        .bind(&client.scope)
        .bind(millis(client.created_at))
        .bind(client.expires_at.map(millis))
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_as_exists(e, &format!("Client {}", client.client_id)))?;
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> AppResult<Option<OAuth2Client>> {
        sqlx::query("SELECT * FROM oauth2_clients WHERE client_id = ?1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_client)
            .transpose()
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(&self, user: &User) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO users (
                id, email, email_verified, password_hash, display_name, given_name,
                family_name, picture, phone_number, phone_number_verified, address,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.given_name)
        .bind(&user.family_name)
        .bind(&user.picture)
        .bind(&user.phone_number)
        .bind(user.phone_number_verified)
        .bind(&user.address)
        .bind(millis(user.created_at))
        .bind(millis(user.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_as_exists(e, "A user with this email"))?;
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_user)
            .transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        sqlx::query("SELECT * FROM users WHERE email = ?1 COLLATE NOCASE")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_user)
            .transpose()
    }
}

#[async_trait]
impl AuthorizationCodeStore for SqliteStore {
    async fn store_code(&self, code: &AuthorizationCode) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_auth_codes (
                code, client_id, user_id, redirect_uri, scope, nonce, code_challenge,
                code_challenge_method, auth_time, sso_session_id, created_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(code.user_id.to_string())
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.nonce)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(millis(code.auth_time))
        .bind(&code.sso_session_id)
        .bind(millis(code.created_at))
        .bind(millis(code.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_code(&self, code: &str) -> AppResult<Option<AuthorizationCode>> {
        sqlx::query("DELETE FROM oauth2_auth_codes WHERE code = ?1 RETURNING *")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_code)
            .transpose()
    }

    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.delete_expired_from("oauth2_auth_codes", now).await
    }
}

#[async_trait]
impl FlowSessionStore for SqliteStore {
    async fn create_flow(&self, flow: &FlowSession) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_flow_sessions (
                session_id, client_id, redirect_uri, scope, state, response_type, nonce,
                code_challenge, code_challenge_method, force_consent, authenticated, user_id,
                auth_time, sso_session_id, created_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ",
        )
        .bind(&flow.session_id)
        .bind(&flow.client_id)
        .bind(&flow.redirect_uri)
        .bind(&flow.scope)
        .bind(&flow.state)
        .bind(&flow.response_type)
        .bind(&flow.nonce)
        .bind(&flow.code_challenge)
        .bind(&flow.code_challenge_method)
        .bind(flow.force_consent)
        .bind(flow.authenticated)
        .bind(flow.user_id.map(|id| id.to_string()))
        .bind(flow.auth_time.map(millis))
        .bind(&flow.sso_session_id)
        .bind(millis(flow.created_at))
        .bind(millis(flow.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_flow(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<FlowSession>> {
        sqlx::query("SELECT * FROM oauth2_flow_sessions WHERE session_id = ?1 AND expires_at > ?2")
            .bind(session_id)
            .bind(millis(now))
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_flow)
            .transpose()
    }

    async fn mark_flow_authenticated(
        &self,
        session_id: &str,
        user_id: Uuid,
        auth_time: DateTime<Utc>,
        sso_session_id: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE oauth2_flow_sessions
            SET authenticated = true, user_id = ?2, auth_time = ?3, sso_session_id = ?4
            WHERE session_id = ?1
            ",
        )
        .bind(session_id)
        .bind(user_id.to_string())
        .bind(millis(auth_time))
        .bind(sso_session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_flow(&self, session_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM oauth2_flow_sessions WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_flows(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.delete_expired_from("oauth2_flow_sessions", now).await
    }
}

#[async_trait]
impl SsoSessionStore for SqliteStore {
    async fn create_session(&self, session: &SsoSession) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO sso_sessions (
                session_id, handle, user_id, authenticated, created_at, last_activity,
                expires_at, ip_address, user_agent
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(&session.session_id)
        .bind(&session.handle)
        .bind(session.user_id.to_string())
        .bind(session.authenticated)
        .bind(millis(session.created_at))
        .bind(millis(session.last_activity))
        .bind(millis(session.expires_at))
        .bind(&session.fingerprint.ip_address)
        .bind(&session.fingerprint.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SsoSession>> {
        sqlx::query("SELECT * FROM sso_sessions WHERE session_id = ?1 AND expires_at > ?2")
            .bind(session_id)
            .bind(millis(now))
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_session)
            .transpose()
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            "UPDATE sso_sessions SET last_activity = ?2 WHERE session_id = ?1 AND last_activity < ?2",
        )
        .bind(session_id)
        .bind(millis(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM sso_sessions WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_sessions_by_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<SsoSession>> {
        let rows = sqlx::query(
            "SELECT * FROM sso_sessions WHERE user_id = ?1 AND expires_at > ?2 ORDER BY created_at",
        )
        .bind(user_id.to_string())
        .bind(millis(now))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_session).collect()
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.delete_expired_from("sso_sessions", now).await
    }
}

#[async_trait]
impl ConsentStore for SqliteStore {
    async fn widen_consent(&self, consent: &UserConsent) -> AppResult<UserConsent> {
        let mut conn = self.pool.acquire().await?;
        // IMMEDIATE takes the write lock before the read, so a concurrent revoke
        // lands wholly before or after the merge
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        let result = Self::widen_consent_locked(&mut conn, consent).await;
        let finish = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        sqlx::query(finish).execute(&mut *conn).await?;
        result
    }

    async fn find_consent(&self, user_id: Uuid, client_id: &str) -> AppResult<Option<UserConsent>> {
        sqlx::query("SELECT * FROM user_consents WHERE user_id = ?1 AND client_id = ?2")
            .bind(user_id.to_string())
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_consent)
            .transpose()
    }

    async fn revoke_consent(&self, user_id: Uuid, client_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM user_consents WHERE user_id = ?1 AND client_id = ?2")
            .bind(user_id.to_string())
            .bind(client_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_consents(&self, user_id: Uuid) -> AppResult<Vec<UserConsent>> {
        let rows = sqlx::query("SELECT * FROM user_consents WHERE user_id = ?1 ORDER BY client_id")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_consent).collect()
    }
}

#[async_trait]
impl RefreshTokenStore for SqliteStore {
    async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO oauth2_refresh_tokens (jti, user_id, client_id, scope, issued_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(&record.jti)
        .bind(record.user_id.to_string())
        .bind(&record.client_id)
        .bind(&record.scope)
        .bind(millis(record.issued_at))
        .bind(millis(record.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_refresh_token(&self, jti: &str) -> AppResult<Option<RefreshTokenRecord>> {
        sqlx::query("DELETE FROM oauth2_refresh_tokens WHERE jti = ?1 RETURNING *")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_refresh)
            .transpose()
    }

    async fn delete_refresh_tokens_for(&self, user_id: Uuid, client_id: &str) -> AppResult<u64> {
        let result =
            sqlx::query("DELETE FROM oauth2_refresh_tokens WHERE user_id = ?1 AND client_id = ?2")
                .bind(user_id.to_string())
                .bind(client_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.delete_expired_from("oauth2_refresh_tokens", now).await
    }
}
