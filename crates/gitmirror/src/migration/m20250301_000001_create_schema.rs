//! Initial migration creating the mirror scheduling and monitoring schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_sync_projects(manager).await?;
        self.create_pull_sync_configs(manager).await?;
        self.create_sync_tasks(manager).await?;
        self.create_monitor_alerts(manager).await?;
        self.create_sync_events(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MonitorAlerts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncTasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PullSyncConfigs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncProjects::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn project_fk<T: Iden + 'static>(
    name: &str,
    table: T,
    column: impl IntoIden,
) -> ForeignKeyCreateStatement {
    ForeignKey::create()
        .name(name)
        .from(table, column)
        .to(SyncProjects::Table, SyncProjects::Id)
        .on_delete(ForeignKeyAction::Cascade)
        .to_owned()
}

impl Migration {
    async fn create_sync_projects(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncProjects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncProjects::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncProjects::ProjectKey).string().not_null())
                    .col(
                        ColumnDef::new(SyncProjects::SyncMethod)
                            .string()
                            .not_null()
                            .default("pull_sync"),
                    )
                    .col(
                        ColumnDef::new(SyncProjects::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SyncProjects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncProjects::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_projects_project_key")
                    .table(SyncProjects::Table)
                    .col(SyncProjects::ProjectKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_pull_sync_configs(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PullSyncConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PullSyncConfigs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PullSyncConfigs::SyncProjectId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PullSyncConfigs::Priority)
                            .string()
                            .not_null()
                            .default("normal"),
                    )
                    .col(
                        ColumnDef::new(PullSyncConfigs::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PullSyncConfigs::LocalRepoPath)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PullSyncConfigs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PullSyncConfigs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(&mut project_fk(
                        "fk_pull_sync_configs_project",
                        PullSyncConfigs::Table,
                        PullSyncConfigs::SyncProjectId,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pull_sync_configs_project")
                    .table(PullSyncConfigs::Table)
                    .col(PullSyncConfigs::SyncProjectId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_tasks(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncTasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncTasks::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncTasks::SyncProjectId).uuid().not_null())
                    .col(ColumnDef::new(SyncTasks::TaskType).string().not_null())
                    .col(
                        ColumnDef::new(SyncTasks::Status)
                            .string()
                            .not_null()
                            .default("waiting"),
                    )
                    // Scheduling
                    .col(
                        ColumnDef::new(SyncTasks::NextRunAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::LastRunAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::ForceSync)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    // Last outcome
                    .col(ColumnDef::new(SyncTasks::LastSyncStatus).string().null())
                    .col(
                        ColumnDef::new(SyncTasks::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncTasks::ErrorType).string().null())
                    .col(ColumnDef::new(SyncTasks::ErrorMessage).text().null())
                    .col(ColumnDef::new(SyncTasks::LastCommitSha).string().null())
                    // Timing
                    .col(
                        ColumnDef::new(SyncTasks::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::DurationSeconds)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(&mut project_fk(
                        "fk_sync_tasks_project",
                        SyncTasks::Table,
                        SyncTasks::SyncProjectId,
                    ))
                    .to_owned(),
            )
            .await?;

        // Exactly one task per (project, type)
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_tasks_project_type")
                    .table(SyncTasks::Table)
                    .col(SyncTasks::SyncProjectId)
                    .col(SyncTasks::TaskType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Due-task range scan
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_tasks_status_next_run")
                    .table(SyncTasks::Table)
                    .col(SyncTasks::Status)
                    .col(SyncTasks::NextRunAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_monitor_alerts(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MonitorAlerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MonitorAlerts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MonitorAlerts::SyncProjectId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MonitorAlerts::ProjectKey)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MonitorAlerts::AlertType).string().not_null())
                    .col(ColumnDef::new(MonitorAlerts::Severity).string().not_null())
                    .col(ColumnDef::new(MonitorAlerts::Title).string().not_null())
                    .col(ColumnDef::new(MonitorAlerts::Description).text().not_null())
                    .col(
                        ColumnDef::new(MonitorAlerts::Metadata)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(MonitorAlerts::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(MonitorAlerts::DedupKey).string().null())
                    .col(
                        ColumnDef::new(MonitorAlerts::TriggeredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MonitorAlerts::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MonitorAlerts::MutedUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(&mut project_fk(
                        "fk_monitor_alerts_project",
                        MonitorAlerts::Table,
                        MonitorAlerts::SyncProjectId,
                    ))
                    .to_owned(),
            )
            .await?;

        // Serializes alert creation per (project, type)
        manager
            .create_index(
                Index::create()
                    .name("idx_monitor_alerts_dedup_key")
                    .table(MonitorAlerts::Table)
                    .col(MonitorAlerts::DedupKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_monitor_alerts_project_status")
                    .table(MonitorAlerts::Table)
                    .col(MonitorAlerts::SyncProjectId)
                    .col(MonitorAlerts::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_events(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncEvents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncEvents::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncEvents::SyncProjectId).uuid().not_null())
                    .col(ColumnDef::new(SyncEvents::EventType).string().not_null())
                    .col(ColumnDef::new(SyncEvents::EventSource).string().not_null())
                    .col(ColumnDef::new(SyncEvents::Status).string().not_null())
                    .col(ColumnDef::new(SyncEvents::GitRef).string().null())
                    .col(ColumnDef::new(SyncEvents::CommitSha).string().null())
                    .col(ColumnDef::new(SyncEvents::Message).text().null())
                    .col(
                        ColumnDef::new(SyncEvents::EventData)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(SyncEvents::EventTime)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(&mut project_fk(
                        "fk_sync_events_project",
                        SyncEvents::Table,
                        SyncEvents::SyncProjectId,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_events_project_time")
                    .table(SyncEvents::Table)
                    .col(SyncEvents::SyncProjectId)
                    .col((SyncEvents::EventTime, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_projects")]
enum SyncProjects {
    Table,
    Id,
    ProjectKey,
    SyncMethod,
    Enabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "pull_sync_configs")]
enum PullSyncConfigs {
    Table,
    Id,
    SyncProjectId,
    Priority,
    Enabled,
    LocalRepoPath,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_tasks")]
enum SyncTasks {
    Table,
    Id,
    SyncProjectId,
    TaskType,
    Status,
    NextRunAt,
    LastRunAt,
    ForceSync,
    LastSyncStatus,
    ConsecutiveFailures,
    ErrorType,
    ErrorMessage,
    LastCommitSha,
    StartedAt,
    CompletedAt,
    DurationSeconds,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "monitor_alerts")]
enum MonitorAlerts {
    Table,
    Id,
    SyncProjectId,
    ProjectKey,
    AlertType,
    Severity,
    Title,
    Description,
    Metadata,
    Status,
    DedupKey,
    TriggeredAt,
    ResolvedAt,
    MutedUntil,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_events")]
enum SyncEvents {
    Table,
    Id,
    SyncProjectId,
    EventType,
    EventSource,
    Status,
    GitRef,
    CommitSha,
    Message,
    EventData,
    EventTime,
}
