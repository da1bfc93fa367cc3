//! Schema migrations, run at startup via [`crate::db::run_migrations`].

// `MigrationTrait` in sea-orm-migration elides the `SchemaManager` lifetime in
// its signatures, and impls must match it exactly (E0195), so this lint cannot
// be satisfied here.
#![allow(elided_lifetimes_in_paths)]

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_purchase_orders_table::Migration),
            Box::new(m20240101_000002_create_purchase_order_items_table::Migration),
            Box::new(m20240101_000003_create_purchase_order_attachments_table::Migration),
            Box::new(m20240101_000004_create_po_sequences_table::Migration),
            Box::new(m20240101_000005_create_audit_logs_table::Migration),
            Box::new(m20240101_000006_create_notifications_table::Migration),
            Box::new(m20240101_000007_create_device_tokens_table::Migration),
        ]
    }
}

mod m20240101_000001_create_purchase_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_purchase_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::PoNumber).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::RequestDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Department).string().not_null())
                        .col(ColumnDef::new(PurchaseOrders::RequestType).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::RequesterName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                        .col(ColumnDef::new(PurchaseOrders::Notes).string().null())
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::ExecutionDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Currency).string().not_null())
                        .col(ColumnDef::new(PurchaseOrders::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_po_number")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::PoNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_status")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_created_by")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::CreatedBy)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_created_at")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseOrders {
        Table,
        Id,
        PoNumber,
        RequestDate,
        Department,
        RequestType,
        RequesterName,
        Status,
        Notes,
        SupplierId,
        ExecutionDate,
        TotalAmount,
        Currency,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_purchase_order_items_table {

    use super::m20240101_000001_create_purchase_orders_table::PurchaseOrders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_purchase_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::ItemId).uuid().null())
                        .col(ColumnDef::new(PurchaseOrderItems::Code).string().not_null())
                        .col(ColumnDef::new(PurchaseOrderItems::Name).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::Unit).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ReceivedQuantity)
                                .integer()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::Price).decimal().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::LineTotal)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Currency)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_po_items_purchase_order")
                                .from(
                                    PurchaseOrderItems::Table,
                                    PurchaseOrderItems::PurchaseOrderId,
                                )
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_po_items_purchase_order_id")
                        .table(PurchaseOrderItems::Table)
                        .col(PurchaseOrderItems::PurchaseOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseOrderItems {
        Table,
        Id,
        PurchaseOrderId,
        ItemId,
        Code,
        Name,
        Quantity,
        Unit,
        ReceivedQuantity,
        Price,
        LineTotal,
        Currency,
        CreatedAt,
    }
}

mod m20240101_000003_create_purchase_order_attachments_table {

    use super::m20240101_000001_create_purchase_orders_table::PurchaseOrders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_purchase_order_attachments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderAttachments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderAttachments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderAttachments::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderAttachments::Url)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderAttachments::UploadedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderAttachments::UploadedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_po_attachments_purchase_order")
                                .from(
                                    PurchaseOrderAttachments::Table,
                                    PurchaseOrderAttachments::PurchaseOrderId,
                                )
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_po_attachments_purchase_order_id")
                        .table(PurchaseOrderAttachments::Table)
                        .col(PurchaseOrderAttachments::PurchaseOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(PurchaseOrderAttachments::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseOrderAttachments {
        Table,
        Id,
        PurchaseOrderId,
        Url,
        UploadedBy,
        UploadedAt,
    }
}

mod m20240101_000004_create_po_sequences_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_po_sequences_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PoSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PoSequences::Period)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PoSequences::Value)
                                .big_integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PoSequences::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PoSequences {
        Table,
        Period,
        Value,
    }
}

mod m20240101_000005_create_audit_logs_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_audit_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AuditLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AuditLogs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AuditLogs::ActorId).uuid().not_null())
                        .col(ColumnDef::new(AuditLogs::Action).string().not_null())
                        .col(ColumnDef::new(AuditLogs::EntityType).string().not_null())
                        .col(ColumnDef::new(AuditLogs::EntityRef).string().not_null())
                        .col(ColumnDef::new(AuditLogs::Details).json().not_null())
                        .col(
                            ColumnDef::new(AuditLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_logs_entity_ref")
                        .table(AuditLogs::Table)
                        .col(AuditLogs::EntityRef)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_logs_actor_id")
                        .table(AuditLogs::Table)
                        .col(AuditLogs::ActorId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_logs_created_at")
                        .table(AuditLogs::Table)
                        .col(AuditLogs::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum AuditLogs {
        Table,
        Id,
        ActorId,
        Action,
        EntityType,
        EntityRef,
        Details,
        CreatedAt,
    }
}

mod m20240101_000006_create_notifications_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(Notifications::NotificationType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::Title).string().not_null())
                        .col(ColumnDef::new(Notifications::Body).string().null())
                        .col(ColumnDef::new(Notifications::Data).json().not_null())
                        .col(
                            ColumnDef::new(Notifications::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_user_id")
                        .table(Notifications::Table)
                        .col(Notifications::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Notifications {
        Table,
        Id,
        UserId,
        NotificationType,
        Title,
        Body,
        Data,
        IsRead,
        CreatedAt,
    }
}

mod m20240101_000007_create_device_tokens_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_device_tokens_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DeviceTokens::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeviceTokens::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeviceTokens::UserId).uuid().not_null())
                        .col(ColumnDef::new(DeviceTokens::Token).string().not_null())
                        .col(
                            ColumnDef::new(DeviceTokens::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_device_tokens_token")
                        .table(DeviceTokens::Table)
                        .col(DeviceTokens::Token)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_device_tokens_user_id")
                        .table(DeviceTokens::Table)
                        .col(DeviceTokens::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeviceTokens::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum DeviceTokens {
        Table,
        Id,
        UserId,
        Token,
        CreatedAt,
    }
}
