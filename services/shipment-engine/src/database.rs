use crate::config::DatabaseConfig;
use crate::errors::Result as EngineResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shipment_core::store::CapacityUpdate;
use shipment_core::types::NewShipment;
use shipment_core::{
    Acceptor, Error, Flight, FlightStatus, Payment, PaymentStatus, Result, Shipment,
    ShipmentStatus, Store, StoreTx, TrackingCode, UserAccount,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const TRACKING_CODE_CONSTRAINT: &str = "shipments_tracking_code_key";
const PAYMENT_REFERENCE_CONSTRAINT: &str = "payments_reference_key";
const OPEN_PAYMENT_INDEX: &str = "payments_one_open_per_shipment";

const SHIPMENT_COLUMNS: &str = "id, sender_id, carrier_id, flight_id, item_weight, \
     acceptor_name, acceptor_phone, acceptor_national_id, acceptor_verified, \
     tracking_code, status, fee, created_at";

const FLIGHT_COLUMNS: &str =
    "id, carrier_id, origin, destination, departure_date, available_kg, status";

const PAYMENT_COLUMNS: &str =
    "id, shipment_id, reference, amount, platform_fee, status, released_at, created_at";

const USER_COLUMNS: &str = "id, full_name, phone, email, balance, points";

#[derive(Debug, FromRow)]
struct FlightRow {
    id: Uuid,
    carrier_id: Uuid,
    origin: String,
    destination: String,
    departure_date: DateTime<Utc>,
    available_kg: Decimal,
    status: String,
}

impl TryFrom<FlightRow> for Flight {
    type Error = Error;

    fn try_from(row: FlightRow) -> Result<Self> {
        Ok(Flight {
            id: row.id,
            carrier_id: row.carrier_id,
            from: row.origin,
            to: row.destination,
            departure_date: row.departure_date,
            available_kg: row.available_kg,
            status: FlightStatus::from_str(&row.status).map_err(Error::Storage)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct ShipmentRow {
    id: Uuid,
    sender_id: Uuid,
    carrier_id: Uuid,
    flight_id: Uuid,
    item_weight: Decimal,
    acceptor_name: String,
    acceptor_phone: String,
    acceptor_national_id: String,
    acceptor_verified: bool,
    tracking_code: Option<String>,
    status: String,
    fee: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = Error;

    fn try_from(row: ShipmentRow) -> Result<Self> {
        let tracking_code = row
            .tracking_code
            .map(TrackingCode::from_stored)
            .ok_or_else(|| Error::Storage(format!("shipment {} has no tracking code", row.id)))?;

        Ok(Shipment {
            id: row.id,
            sender_id: row.sender_id,
            carrier_id: row.carrier_id,
            flight_id: row.flight_id,
            item_weight: row.item_weight,
            acceptor: Acceptor {
                name: row.acceptor_name,
                phone: row.acceptor_phone,
                national_id: row.acceptor_national_id,
            },
            acceptor_verified: row.acceptor_verified,
            tracking_code,
            status: ShipmentStatus::from_str(&row.status).map_err(Error::Storage)?,
            fee: row.fee,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    shipment_id: Uuid,
    reference: String,
    amount: Decimal,
    platform_fee: Option<Decimal>,
    status: String,
    released_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = Error;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(Payment {
            id: row.id,
            shipment_id: row.shipment_id,
            reference: row.reference,
            amount: row.amount,
            platform_fee: row.platform_fee,
            status: PaymentStatus::from_str(&row.status).map_err(Error::Storage)?,
            released_at: row.released_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    full_name: String,
    phone: String,
    email: Option<String>,
    balance: Decimal,
    points: i64,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        UserAccount {
            id: row.id,
            full_name: row.full_name,
            phone: row.phone,
            email: row.email,
            balance: row.balance,
            points: row.points,
        }
    }
}

fn storage(err: sqlx::Error) -> Error {
    Error::Storage(err.to_string())
}

/// Unique violations on known constraints become domain errors; `duplicate`
/// maps a violated constraint name to one, or `None` to keep it a storage
/// failure.
fn on_unique(err: sqlx::Error, duplicate: impl FnOnce(&str) -> Option<Error>) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            if let Some(mapped) = db.constraint().and_then(duplicate) {
                return mapped;
            }
        }
    }
    storage(err)
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await?;

        Ok(PgStore { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> EngineResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    /// Insert or replace a user account
    pub async fn upsert_user(&self, user: &UserAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, phone, email, balance, points)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, phone = EXCLUDED.phone, email = EXCLUDED.email
            "#,
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.phone)
        .bind(&user.email)
        .bind(user.balance)
        .bind(user.points)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    /// Insert or replace a flight
    pub async fn upsert_flight(&self, flight: &Flight) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flights (id, carrier_id, origin, destination, departure_date, available_kg, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET origin = EXCLUDED.origin,
                destination = EXCLUDED.destination,
                departure_date = EXCLUDED.departure_date,
                available_kg = EXCLUDED.available_kg,
                status = EXCLUDED.status
            "#,
        )
        .bind(flight.id)
        .bind(flight.carrier_id)
        .bind(&flight.from)
        .bind(&flight.to)
        .bind(flight.departure_date)
        .bind(flight.available_kg)
        .bind(flight.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(storage)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn flight(&self, flight_id: Uuid) -> Result<Option<Flight>> {
        let sql = format!("SELECT {} FROM flights WHERE id = $1", FLIGHT_COLUMNS);
        sqlx::query_as::<_, FlightRow>(&sql)
            .bind(flight_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .map(Flight::try_from)
            .transpose()
    }

    async fn user(&self, user_id: Uuid) -> Result<Option<UserAccount>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .map(UserAccount::from))
    }

    async fn shipment_by_code(&self, code: &TrackingCode) -> Result<Option<Shipment>> {
        let sql = format!(
            "SELECT {} FROM shipments WHERE tracking_code = $1",
            SHIPMENT_COLUMNS
        );
        sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .map(Shipment::try_from)
            .transpose()
    }

    async fn shipment(&self, shipment_id: Uuid) -> Result<Option<Shipment>> {
        let sql = format!(
            "SELECT {} FROM shipments WHERE id = $1 AND tracking_code IS NOT NULL",
            SHIPMENT_COLUMNS
        );
        sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(shipment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .map(Shipment::try_from)
            .transpose()
    }

    async fn shipments_for_carrier(&self, carrier_id: Uuid) -> Result<Vec<Shipment>> {
        let sql = format!(
            "SELECT {} FROM shipments WHERE carrier_id = $1 AND tracking_code IS NOT NULL \
             ORDER BY created_at DESC",
            SHIPMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(carrier_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        convert_all(rows)
    }

    async fn bookable_flights(&self) -> Result<Vec<Flight>> {
        let sql = format!(
            "SELECT {} FROM flights WHERE available_kg > 0 AND status = 'on-time' \
             ORDER BY departure_date ASC",
            FLIGHT_COLUMNS
        );
        let rows = sqlx::query_as::<_, FlightRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        convert_all(rows)
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE reference = $1", PAYMENT_COLUMNS);
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn payments_for_shipment(&self, shipment_id: Uuid) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE shipment_id = $1 ORDER BY created_at ASC",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(shipment_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        convert_all(rows)
    }
}

/// One database transaction. Dropping it without `commit` rolls back.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn flight(&mut self, flight_id: Uuid) -> Result<Option<Flight>> {
        let sql = format!("SELECT {} FROM flights WHERE id = $1", FLIGHT_COLUMNS);
        sqlx::query_as::<_, FlightRow>(&sql)
            .bind(flight_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?
            .map(Flight::try_from)
            .transpose()
    }

    async fn decrement_capacity(
        &mut self,
        flight_id: Uuid,
        weight: Decimal,
    ) -> Result<CapacityUpdate> {
        let remaining: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE flights
            SET available_kg = available_kg - $2
            WHERE id = $1 AND available_kg >= $2
            RETURNING available_kg
            "#,
        )
        .bind(flight_id)
        .bind(weight)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage)?;

        if let Some(remaining) = remaining {
            return Ok(CapacityUpdate::Applied { remaining });
        }

        let available: Option<Decimal> =
            sqlx::query_scalar("SELECT available_kg FROM flights WHERE id = $1")
                .bind(flight_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(storage)?;

        Ok(match available {
            Some(available) => CapacityUpdate::Insufficient { available },
            None => CapacityUpdate::Missing,
        })
    }

    async fn insert_shipment(&mut self, shipment: &NewShipment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shipments (
                id, sender_id, carrier_id, flight_id, item_weight,
                acceptor_name, acceptor_phone, acceptor_national_id,
                acceptor_verified, status, fee, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, 'CREATED', $9, $10)
            "#,
        )
        .bind(shipment.id)
        .bind(shipment.sender_id)
        .bind(shipment.carrier_id)
        .bind(shipment.flight_id)
        .bind(shipment.item_weight)
        .bind(&shipment.acceptor.name)
        .bind(&shipment.acceptor.phone)
        .bind(&shipment.acceptor.national_id)
        .bind(shipment.fee)
        .bind(shipment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn attach_tracking_code(
        &mut self,
        shipment_id: Uuid,
        code: &TrackingCode,
    ) -> Result<Shipment> {
        let sql = format!(
            "UPDATE shipments SET tracking_code = $2 \
             WHERE id = $1 AND tracking_code IS NULL RETURNING {}",
            SHIPMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(shipment_id)
            .bind(code.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                on_unique(e, |constraint| {
                    (constraint == TRACKING_CODE_CONSTRAINT)
                        .then(|| Error::DuplicateTrackingCode(code.to_string()))
                })
            })?
            .ok_or_else(|| Error::ShipmentNotFound(shipment_id.to_string()))?;
        Shipment::try_from(row)
    }

    async fn shipment(&mut self, shipment_id: Uuid) -> Result<Option<Shipment>> {
        let sql = format!(
            "SELECT {} FROM shipments WHERE id = $1 AND tracking_code IS NOT NULL FOR UPDATE",
            SHIPMENT_COLUMNS
        );
        sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(shipment_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?
            .map(Shipment::try_from)
            .transpose()
    }

    async fn mark_delivered(&mut self, shipment_id: Uuid) -> Result<Option<Shipment>> {
        let sql = format!(
            "UPDATE shipments SET status = 'DELIVERED' \
             WHERE id = $1 AND status = 'CREATED' RETURNING {}",
            SHIPMENT_COLUMNS
        );
        sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(shipment_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?
            .map(Shipment::try_from)
            .transpose()
    }

    async fn open_payment(&mut self, shipment_id: Uuid) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE shipment_id = $1 AND status IN ('pending', 'paid') \
             ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(shipment_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn release_payment(
        &mut self,
        payment_id: Uuid,
        platform_fee: Decimal,
        released_at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        let sql = format!(
            "UPDATE payments SET status = 'released', platform_fee = $2, released_at = $3 \
             WHERE id = $1 AND status <> 'released' RETURNING {}",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment_id)
            .bind(platform_fee)
            .bind(released_at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<Payment> {
        let sql = format!(
            "INSERT INTO payments ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {cols}",
            cols = PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment.id)
            .bind(payment.shipment_id)
            .bind(&payment.reference)
            .bind(payment.amount)
            .bind(payment.platform_fee)
            .bind(payment.status.as_str())
            .bind(payment.released_at)
            .bind(payment.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| {
                on_unique(e, |constraint| match constraint {
                    PAYMENT_REFERENCE_CONSTRAINT => {
                        Some(Error::DuplicatePaymentReference(payment.reference.clone()))
                    }
                    OPEN_PAYMENT_INDEX => {
                        Some(Error::PaymentInProgress(payment.shipment_id.to_string()))
                    }
                    _ => None,
                })
            })?;
        Payment::try_from(row)
    }

    async fn mark_payment_paid(&mut self, reference: &str) -> Result<Option<Payment>> {
        let sql = format!(
            "UPDATE payments SET status = 'paid' \
             WHERE reference = $1 AND status = 'pending' RETURNING {}",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(reference)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn credit_balance(&mut self, user_id: Uuid, amount: Decimal) -> Result<Decimal> {
        sqlx::query_scalar::<_, Decimal>(
            "UPDATE users SET balance = balance + $2 WHERE id = $1 RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage)?
        .ok_or(Error::UserNotFound(user_id))
    }

    async fn credit_points(&mut self, user_id: Uuid, points: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE users SET points = points + $2 WHERE id = $1 RETURNING points",
        )
        .bind(user_id)
        .bind(points)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage)?
        .ok_or(Error::UserNotFound(user_id))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(storage)
    }
}
