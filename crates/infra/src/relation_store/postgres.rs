//! Postgres-backed Relation Store and Sharing Ledger.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `DuplicateExternalId` | Concurrent insert of the same `(tenant, external id)` |
//! | Database (other) | Any other | `Backend` | Constraint or server failure |
//! | PoolClosed / other | N/A | `Backend` | Connection failures |
//! | Row decode failure | N/A | `Corrupt` | Stored value no longer parses into the domain |
//!
//! Every `commit` runs in one transaction; a relation row and its stages are
//! written or removed together (`ON DELETE CASCADE` on the stage table).

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use bpgate_core::{
    AggregateRoot, Bpnl, DomainError, ExpectedVersion, ExternalId, Page, PageRequest, RelationId, SharingStateId,
    TenantBpnl,
};
use bpgate_relations::{
    InputRelation, InputRelationFilter, OutputRelation, OutputRelationFilter, Relation, RelationOutput,
    RelationSharingState, RelationSharingStateType, RelationSharingStateView, RelationSnapshot, RelationStage,
    RelationType, SharingStateFilter, SharingStateRecord, SharingStateType, StageType,
};

use super::r#trait::{RelationChange, RelationStore, StoreError};
use crate::sharing_ledger::SharingLedger;

/// Schema applied by [`PostgresGateStore::migrate`].
pub const MIGRATION: &str = include_str!("../../migrations/0001_relations.sql");

const RELATION_COLUMNS: &str = r#"
    r.id, r.tenant_bpnl, r.external_id, r.version,
    r.sharing_state_type, r.sharing_relation_type, r.sharing_error_message, r.sharing_updated_at,
    r.output_relation_type, r.output_source_bpnl, r.output_target_bpnl, r.output_updated_at,
    r.created_at, r.updated_at,
    s.relation_type AS stage_relation_type, s.source_id, s.target_id,
    s.created_at AS stage_created_at, s.updated_at AS stage_updated_at
"#;

const RELATION_FROM: &str = r#"
    FROM relations r
    LEFT JOIN relation_stages s ON s.relation_id = r.id AND s.stage = 'Input'
"#;

const INPUT_FROM_WHERE: &str = r#"
    FROM relations r
    JOIN relation_stages s ON s.relation_id = r.id AND s.stage = 'Input'
    JOIN sharing_states src ON src.id = s.source_id
    JOIN sharing_states tgt ON tgt.id = s.target_id
    WHERE r.tenant_bpnl = $1
        AND (cardinality($2::text[]) = 0 OR r.external_id = ANY($2))
        AND (cardinality($3::text[]) = 0 OR s.relation_type = ANY($3))
        AND (cardinality($4::text[]) = 0 OR src.external_id = ANY($4))
        AND (cardinality($5::text[]) = 0 OR tgt.external_id = ANY($5))
        AND ($6::timestamptz IS NULL OR s.updated_at >= $6)
"#;

const OUTPUT_FROM_WHERE: &str = r#"
    FROM relations r
    WHERE r.tenant_bpnl = $1
        AND r.output_relation_type IS NOT NULL
        AND (cardinality($2::text[]) = 0 OR r.external_id = ANY($2))
        AND (cardinality($3::text[]) = 0 OR r.output_relation_type = ANY($3))
        AND (cardinality($4::text[]) = 0 OR r.output_source_bpnl = ANY($4))
        AND (cardinality($5::text[]) = 0 OR r.output_target_bpnl = ANY($5))
        AND ($6::timestamptz IS NULL OR r.output_updated_at >= $6)
"#;

const SHARING_FROM_WHERE: &str = r#"
    FROM relations r
    WHERE r.tenant_bpnl = $1
        AND r.sharing_state_type IS NOT NULL
        AND (cardinality($2::text[]) = 0 OR r.external_id = ANY($2))
        AND (cardinality($3::text[]) = 0 OR r.sharing_state_type = ANY($3))
"#;

/// Postgres-backed Relation Store and Sharing Ledger.
///
/// Every query includes `tenant_bpnl` in the WHERE clause except the cross-tenant
/// sharing claim. Inserts are serialised by the `(tenant_bpnl, external_id)`
/// unique constraint; updates and deletes are guarded by the row's `version`.
#[derive(Debug, Clone)]
pub struct PostgresGateStore {
    pool: Arc<PgPool>,
}

impl PostgresGateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a connection pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Write a ledger record, replacing the one with the same id.
    #[instrument(
        skip(self, record),
        fields(tenant = %record.tenant, external_id = %record.external_id),
        err
    )]
    pub async fn upsert_sharing_state(&self, record: &SharingStateRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sharing_states (id, tenant_bpnl, external_id, sharing_state_type, bpnl, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                sharing_state_type = EXCLUDED.sharing_state_type,
                bpnl = EXCLUDED.bpnl,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.tenant.as_str())
        .bind(record.external_id.as_str())
        .bind(record.sharing_state_type.as_str())
        .bind(record.bpnl.as_ref().map(Bpnl::as_str))
        .bind(record.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_sharing_state", e))?;
        Ok(())
    }
}

#[async_trait]
impl SharingLedger for PostgresGateStore {
    #[instrument(skip(self), fields(tenant = %tenant, external_id = %external_id), err)]
    async fn find_partner_records(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Vec<SharingStateRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_bpnl, external_id, sharing_state_type, bpnl, updated_at
            FROM sharing_states
            WHERE tenant_bpnl = $1 AND external_id = $2
            "#,
        )
        .bind(tenant.as_str())
        .bind(external_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_partner_records", e))?;

        rows.iter().map(sharing_state_from_row).collect()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn find_partner_records_by_ids(&self, ids: &[SharingStateId]) -> Result<Vec<SharingStateRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        let rows = sqlx::query(
            r#"
            SELECT id, tenant_bpnl, external_id, sharing_state_type, bpnl, updated_at
            FROM sharing_states
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_partner_records_by_ids", e))?;

        rows.iter().map(sharing_state_from_row).collect()
    }
}

#[async_trait]
impl RelationStore for PostgresGateStore {
    #[instrument(
        skip(self),
        fields(tenant = %tenant, external_id = %external_id, operation = tracing::field::Empty),
        err
    )]
    async fn find_by_external_id(
        &self,
        tenant: &TenantBpnl,
        external_id: &ExternalId,
    ) -> Result<Option<Relation>, StoreError> {
        Span::current().record("operation", "find_by_external_id");

        let sql = format!("SELECT {RELATION_COLUMNS} {RELATION_FROM} WHERE r.tenant_bpnl = $1 AND r.external_id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant.as_str())
            .bind(external_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_external_id", e))?;

        row.as_ref().map(relation_from_row).transpose()
    }

    #[instrument(skip(self), fields(relation_id = %relation_id, stage = stage.as_str()), err)]
    async fn find_stage(&self, relation_id: RelationId, stage: StageType) -> Result<Option<RelationStage>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT relation_id, stage, relation_type, source_id, target_id, created_at, updated_at
            FROM relation_stages
            WHERE relation_id = $1 AND stage = $2
            "#,
        )
        .bind(relation_id.as_uuid())
        .bind(stage.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_stage", e))?;

        row.map(|row| -> Result<RelationStage, StoreError> {
            let stage: String = try_get(&row, "stage")?;
            let relation_type: String = try_get(&row, "relation_type")?;
            Ok(RelationStage {
                relation_id: RelationId::from_uuid(try_get(&row, "relation_id")?),
                stage: parse(&stage)?,
                relation_type: parse(&relation_type)?,
                source: SharingStateId::from_uuid(try_get(&row, "source_id")?),
                target: SharingStateId::from_uuid(try_get(&row, "target_id")?),
                created_at: try_get(&row, "created_at")?,
                updated_at: try_get(&row, "updated_at")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(state = state.as_str()), err)]
    async fn find_by_sharing_state(
        &self,
        state: RelationSharingStateType,
        limit: usize,
    ) -> Result<Vec<Relation>, StoreError> {
        let sql = format!(
            "SELECT {RELATION_COLUMNS} {RELATION_FROM} WHERE r.sharing_state_type = $1 \
             ORDER BY r.sharing_updated_at ASC, r.created_at ASC, r.id ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(state.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_sharing_state", e))?;

        rows.iter().map(relation_from_row).collect()
    }

    #[instrument(skip(self, changes), fields(change_count = changes.len(), operation = tracing::field::Empty), err)]
    async fn commit(&self, changes: Vec<RelationChange>) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        Span::current().record("operation", "commit");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for change in changes {
            match change {
                RelationChange::Insert(relation) => insert_relation(&mut tx, &relation).await?,
                RelationChange::Update {
                    relation,
                    expected_version,
                } => update_relation(&mut tx, &relation, expected_version).await?,
                RelationChange::Delete {
                    relation_id,
                    expected_version,
                } => delete_relation(&mut tx, relation_id, expected_version).await?,
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self, filter), fields(tenant = %tenant, page = page.page, size = page.size), err)]
    async fn search_input(
        &self,
        tenant: &TenantBpnl,
        filter: &InputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<InputRelation>, StoreError> {
        let external_ids = strings(&filter.external_ids, ExternalId::as_str);
        let relation_types = strings(&filter.relation_types, |t| t.as_str());
        let sources = strings(&filter.source_external_ids, ExternalId::as_str);
        let targets = strings(&filter.target_external_ids, ExternalId::as_str);

        let count_sql = format!("SELECT COUNT(*) AS total {INPUT_FROM_WHERE}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(tenant.as_str())
            .bind(&external_ids)
            .bind(&relation_types)
            .bind(&sources)
            .bind(&targets)
            .bind(filter.updated_after)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_input", e))
            .and_then(|row| try_get(&row, "total"))?;

        let sql = format!(
            "SELECT r.external_id, s.relation_type, src.external_id AS source_external_id, \
             tgt.external_id AS target_external_id, s.created_at, s.updated_at \
             {INPUT_FROM_WHERE} ORDER BY r.created_at ASC, r.id ASC LIMIT $7 OFFSET $8"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant.as_str())
            .bind(&external_ids)
            .bind(&relation_types)
            .bind(&sources)
            .bind(&targets)
            .bind(filter.updated_after)
            .bind(page_limit(page))
            .bind(page_offset(page))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_input", e))?;

        let content = rows
            .iter()
            .map(|row| -> Result<InputRelation, StoreError> {
                let relation_type: String = try_get(row, "relation_type")?;
                Ok(InputRelation {
                    external_id: parse_key(try_get(row, "external_id")?)?,
                    relation_type: parse(&relation_type)?,
                    source_external_id: parse_key(try_get(row, "source_external_id")?)?,
                    target_external_id: parse_key(try_get(row, "target_external_id")?)?,
                    created_at: try_get(row, "created_at")?,
                    updated_at: try_get(row, "updated_at")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(page, total_count(total), content))
    }

    #[instrument(skip(self, filter), fields(tenant = %tenant, page = page.page, size = page.size), err)]
    async fn search_output(
        &self,
        tenant: &TenantBpnl,
        filter: &OutputRelationFilter,
        page: PageRequest,
    ) -> Result<Page<OutputRelation>, StoreError> {
        let external_ids = strings(&filter.external_ids, ExternalId::as_str);
        let relation_types = strings(&filter.relation_types, |t| t.as_str());
        let sources = strings(&filter.source_bpnls, Bpnl::as_str);
        let targets = strings(&filter.target_bpnls, Bpnl::as_str);

        let count_sql = format!("SELECT COUNT(*) AS total {OUTPUT_FROM_WHERE}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(tenant.as_str())
            .bind(&external_ids)
            .bind(&relation_types)
            .bind(&sources)
            .bind(&targets)
            .bind(filter.updated_after)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_output", e))
            .and_then(|row| try_get(&row, "total"))?;

        let sql = format!(
            "SELECT r.external_id, r.output_relation_type, r.output_source_bpnl, r.output_target_bpnl, \
             r.output_updated_at {OUTPUT_FROM_WHERE} ORDER BY r.created_at ASC, r.id ASC LIMIT $7 OFFSET $8"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant.as_str())
            .bind(&external_ids)
            .bind(&relation_types)
            .bind(&sources)
            .bind(&targets)
            .bind(filter.updated_after)
            .bind(page_limit(page))
            .bind(page_offset(page))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_output", e))?;

        let content = rows
            .iter()
            .map(|row| -> Result<OutputRelation, StoreError> {
                let relation_type: String = try_get(row, "output_relation_type")?;
                Ok(OutputRelation {
                    external_id: parse_key(try_get(row, "external_id")?)?,
                    relation_type: parse(&relation_type)?,
                    source_bpnl: parse_key(try_get(row, "output_source_bpnl")?)?,
                    target_bpnl: parse_key(try_get(row, "output_target_bpnl")?)?,
                    updated_at: try_get(row, "output_updated_at")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(page, total_count(total), content))
    }

    #[instrument(skip(self, filter), fields(tenant = %tenant, page = page.page, size = page.size), err)]
    async fn search_sharing_states(
        &self,
        tenant: &TenantBpnl,
        filter: &SharingStateFilter,
        page: PageRequest,
    ) -> Result<Page<RelationSharingStateView>, StoreError> {
        let external_ids = strings(&filter.external_ids, ExternalId::as_str);
        let state_types = strings(&filter.state_types, |t| t.as_str());

        let count_sql = format!("SELECT COUNT(*) AS total {SHARING_FROM_WHERE}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(tenant.as_str())
            .bind(&external_ids)
            .bind(&state_types)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_sharing_states", e))
            .and_then(|row| try_get(&row, "total"))?;

        let sql = format!(
            "SELECT r.external_id, r.sharing_state_type, r.sharing_relation_type, r.sharing_error_message, \
             r.sharing_updated_at {SHARING_FROM_WHERE} ORDER BY r.created_at ASC, r.id ASC LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant.as_str())
            .bind(&external_ids)
            .bind(&state_types)
            .bind(page_limit(page))
            .bind(page_offset(page))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_sharing_states", e))?;

        let content = rows
            .iter()
            .map(|row| -> Result<RelationSharingStateView, StoreError> {
                let state_type: String = try_get(row, "sharing_state_type")?;
                let relation_type: String = try_get(row, "sharing_relation_type")?;
                Ok(RelationSharingStateView {
                    external_id: parse_key(try_get(row, "external_id")?)?,
                    relation_type: parse(&relation_type)?,
                    sharing_state_type: parse(&state_type)?,
                    error_message: try_get(row, "sharing_error_message")?,
                    updated_at: try_get(row, "sharing_updated_at")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(page, total_count(total), content))
    }
}

async fn insert_relation(tx: &mut Transaction<'_, Postgres>, relation: &Relation) -> Result<(), StoreError> {
    let columns = RelationColumns::of(relation);
    sqlx::query(
        r#"
        INSERT INTO relations (
            id, tenant_bpnl, external_id, version,
            sharing_state_type, sharing_relation_type, sharing_error_message, sharing_updated_at,
            output_relation_type, output_source_bpnl, output_target_bpnl, output_updated_at,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(relation.id().as_uuid())
    .bind(relation.tenant().as_str())
    .bind(relation.external_id().as_str())
    .bind(columns.version)
    .bind(columns.sharing_state_type)
    .bind(columns.sharing_relation_type)
    .bind(columns.sharing_error_message)
    .bind(columns.sharing_updated_at)
    .bind(columns.output_relation_type)
    .bind(columns.output_source_bpnl)
    .bind(columns.output_target_bpnl)
    .bind(columns.output_updated_at)
    .bind(relation.created_at())
    .bind(relation.updated_at())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::DuplicateExternalId {
                tenant: relation.tenant().clone(),
                external_id: relation.external_id().clone(),
            }
        } else {
            map_sqlx_error("insert_relation", e)
        }
    })?;

    write_input_stage(tx, relation).await
}

async fn update_relation(
    tx: &mut Transaction<'_, Postgres>,
    relation: &Relation,
    expected_version: ExpectedVersion,
) -> Result<(), StoreError> {
    let columns = RelationColumns::of(relation);
    let result = sqlx::query(
        r#"
        UPDATE relations SET
            version = $2,
            sharing_state_type = $3,
            sharing_relation_type = $4,
            sharing_error_message = $5,
            sharing_updated_at = $6,
            output_relation_type = $7,
            output_source_bpnl = $8,
            output_target_bpnl = $9,
            output_updated_at = $10,
            updated_at = $11
        WHERE id = $1 AND ($12::bigint IS NULL OR version = $12)
        "#,
    )
    .bind(relation.id().as_uuid())
    .bind(columns.version)
    .bind(columns.sharing_state_type)
    .bind(columns.sharing_relation_type)
    .bind(columns.sharing_error_message)
    .bind(columns.sharing_updated_at)
    .bind(columns.output_relation_type)
    .bind(columns.output_source_bpnl)
    .bind(columns.output_target_bpnl)
    .bind(columns.output_updated_at)
    .bind(relation.updated_at())
    .bind(expected(expected_version))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_relation", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Concurrency(format!(
            "relation {}: expected {expected_version:?}",
            relation.id()
        )));
    }

    write_input_stage(tx, relation).await
}

async fn delete_relation(
    tx: &mut Transaction<'_, Postgres>,
    relation_id: RelationId,
    expected_version: ExpectedVersion,
) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM relations WHERE id = $1 AND ($2::bigint IS NULL OR version = $2)")
        .bind(relation_id.as_uuid())
        .bind(expected(expected_version))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_relation", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Concurrency(format!(
            "relation {relation_id}: expected {expected_version:?}"
        )));
    }
    Ok(())
}

async fn write_input_stage(tx: &mut Transaction<'_, Postgres>, relation: &Relation) -> Result<(), StoreError> {
    let Some(stage) = relation.input() else {
        sqlx::query("DELETE FROM relation_stages WHERE relation_id = $1 AND stage = 'Input'")
            .bind(relation.id().as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_stage", e))?;
        return Ok(());
    };

    sqlx::query(
        r#"
        INSERT INTO relation_stages (relation_id, stage, relation_type, source_id, target_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (relation_id, stage) DO UPDATE SET
            relation_type = EXCLUDED.relation_type,
            source_id = EXCLUDED.source_id,
            target_id = EXCLUDED.target_id,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(stage.relation_id.as_uuid())
    .bind(stage.stage.as_str())
    .bind(stage.relation_type.as_str())
    .bind(stage.source.as_uuid())
    .bind(stage.target.as_uuid())
    .bind(stage.created_at)
    .bind(stage.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_stage", e))?;
    Ok(())
}

/// Flattened relation columns shared by insert and update.
struct RelationColumns<'a> {
    version: i64,
    sharing_state_type: Option<&'static str>,
    sharing_relation_type: Option<&'static str>,
    sharing_error_message: Option<&'a str>,
    sharing_updated_at: Option<DateTime<Utc>>,
    output_relation_type: Option<&'static str>,
    output_source_bpnl: Option<&'a str>,
    output_target_bpnl: Option<&'a str>,
    output_updated_at: Option<DateTime<Utc>>,
}

impl<'a> RelationColumns<'a> {
    fn of(relation: &'a Relation) -> Self {
        let sharing = relation.sharing_state();
        let output = relation.output();
        Self {
            version: i64::try_from(relation.version()).unwrap_or(i64::MAX),
            sharing_state_type: sharing.map(|s| s.state_type().as_str()),
            sharing_relation_type: sharing.map(|s| s.relation_type().as_str()),
            sharing_error_message: sharing.and_then(RelationSharingState::error_message),
            sharing_updated_at: sharing.map(RelationSharingState::updated_at),
            output_relation_type: output.map(|o| o.relation_type.as_str()),
            output_source_bpnl: output.map(|o| o.source_bpnl.as_str()),
            output_target_bpnl: output.map(|o| o.target_bpnl.as_str()),
            output_updated_at: output.map(|o| o.updated_at),
        }
    }
}

fn relation_from_row(row: &PgRow) -> Result<Relation, StoreError> {
    let id = RelationId::from_uuid(try_get(row, "id")?);

    let input = match try_get::<Option<String>>(row, "stage_relation_type")? {
        Some(relation_type) => Some(RelationStage {
            relation_id: id,
            stage: StageType::Input,
            relation_type: parse(&relation_type)?,
            source: SharingStateId::from_uuid(try_get(row, "source_id")?),
            target: SharingStateId::from_uuid(try_get(row, "target_id")?),
            created_at: try_get(row, "stage_created_at")?,
            updated_at: try_get(row, "stage_updated_at")?,
        }),
        None => None,
    };

    let sharing_state = match try_get::<Option<String>>(row, "sharing_state_type")? {
        Some(state_type) => {
            let relation_type: String = try_get(row, "sharing_relation_type")?;
            Some(RelationSharingState::restore(
                parse(&state_type)?,
                parse(&relation_type)?,
                try_get(row, "sharing_error_message")?,
                try_get(row, "sharing_updated_at")?,
            ))
        }
        None => None,
    };

    let output = match try_get::<Option<String>>(row, "output_relation_type")? {
        Some(relation_type) => Some(RelationOutput {
            relation_type: parse::<RelationType>(&relation_type)?,
            source_bpnl: parse_key(try_get(row, "output_source_bpnl")?)?,
            target_bpnl: parse_key(try_get(row, "output_target_bpnl")?)?,
            updated_at: try_get(row, "output_updated_at")?,
        }),
        None => None,
    };

    let version: i64 = try_get(row, "version")?;
    Ok(Relation::restore(RelationSnapshot {
        id,
        tenant: parse_key(try_get(row, "tenant_bpnl")?)?,
        external_id: parse_key(try_get(row, "external_id")?)?,
        input,
        sharing_state,
        output,
        created_at: try_get(row, "created_at")?,
        updated_at: try_get(row, "updated_at")?,
        version: u64::try_from(version).map_err(|_| StoreError::Corrupt(format!("negative version {version}")))?,
    }))
}

fn sharing_state_from_row(row: &PgRow) -> Result<SharingStateRecord, StoreError> {
    let state_type: String = try_get(row, "sharing_state_type")?;
    let bpnl: Option<String> = try_get(row, "bpnl")?;
    Ok(SharingStateRecord {
        id: SharingStateId::from_uuid(try_get(row, "id")?),
        tenant: parse_key(try_get(row, "tenant_bpnl")?)?,
        external_id: parse_key(try_get(row, "external_id")?)?,
        sharing_state_type: parse::<SharingStateType>(&state_type)?,
        bpnl: bpnl.map(parse_key).transpose()?,
        updated_at: try_get(row, "updated_at")?,
    })
}

fn try_get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("failed to read column {column}: {e}")))
}

fn parse<T: FromStr<Err = DomainError>>(value: &str) -> Result<T, StoreError> {
    value.parse().map_err(|e: DomainError| StoreError::Corrupt(e.to_string()))
}

fn parse_key<T: TryFrom<String, Error = DomainError>>(value: String) -> Result<T, StoreError> {
    T::try_from(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn strings<T>(values: &[T], f: impl Fn(&T) -> &str) -> Vec<String> {
    values.iter().map(|v| f(v).to_string()).collect()
}

fn expected(version: ExpectedVersion) -> Option<i64> {
    match version {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(i64::try_from(v).unwrap_or(i64::MAX)),
    }
}

fn page_limit(page: PageRequest) -> i64 {
    i64::try_from(page.limit()).unwrap_or(i64::MAX)
}

fn page_offset(page: PageRequest) -> i64 {
    i64::try_from(page.offset()).unwrap_or(i64::MAX)
}

fn total_count(total: i64) -> u64 {
    u64::try_from(total).unwrap_or(0)
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            StoreError::Backend(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        sqlx::Error::RowNotFound => StoreError::Backend(format!("unexpected row not found in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
