use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260101_000001_create_repair_desk_tables::Migration)]
    }
}

mod m20260101_000001_create_repair_desk_tables {
    use crate::entities::{
        order_sequence::WORK_ORDER_SEQUENCE, CatalogItem, Client, CostLine, Equipment,
        OrderSequence, OtpChallenge, TechnicalSheet, Technician, WorkOrder,
    };
    use sea_orm_migration::{
        prelude::*,
        sea_orm::{ConnectionTrait, EntityTrait, Schema},
    };

    pub struct Migration;

    fn create_stmt<E: EntityTrait>(schema: &Schema, entity: E) -> TableCreateStatement {
        schema
            .create_table_from_entity(entity)
            .if_not_exists()
            .to_owned()
    }

    fn drop_stmt<E: EntityTrait>(entity: E) -> TableDropStatement {
        Table::drop().table(entity).if_exists().to_owned()
    }

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000001_create_repair_desk_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();
            let schema = Schema::new(backend);

            // Parents before children so foreign keys resolve.
            let stmts = vec![
                create_stmt(&schema, Client),
                create_stmt(&schema, Technician),
                create_stmt(&schema, Equipment),
                create_stmt(&schema, CatalogItem),
                create_stmt(&schema, OrderSequence),
                create_stmt(&schema, WorkOrder),
                create_stmt(&schema, CostLine),
                create_stmt(&schema, TechnicalSheet),
                create_stmt(&schema, OtpChallenge),
            ];

            for stmt in stmts {
                manager.create_table(stmt).await?;
            }

            manager
                .create_index(
                    Index::create()
                        .name("idx_cost_lines_work_order_position")
                        .table(CostLine)
                        .col(crate::entities::cost_line::Column::WorkOrderId)
                        .col(crate::entities::cost_line::Column::Position)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_otp_challenges_user_issued")
                        .table(OtpChallenge)
                        .col(crate::entities::otp_challenge::Column::UserId)
                        .col(crate::entities::otp_challenge::Column::IssuedAt)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            let seed = Query::insert()
                .into_table(OrderSequence)
                .columns([
                    crate::entities::order_sequence::Column::Name,
                    crate::entities::order_sequence::Column::Value,
                ])
                .values_panic([WORK_ORDER_SEQUENCE.into(), 0i64.into()])
                .on_conflict(
                    OnConflict::column(crate::entities::order_sequence::Column::Name)
                        .do_nothing()
                        .to_owned(),
                )
                .to_owned();
            manager
                .get_connection()
                .execute(backend.build(&seed))
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let stmts = vec![
                drop_stmt(OtpChallenge),
                drop_stmt(TechnicalSheet),
                drop_stmt(CostLine),
                drop_stmt(WorkOrder),
                drop_stmt(OrderSequence),
                drop_stmt(CatalogItem),
                drop_stmt(Equipment),
                drop_stmt(Technician),
                drop_stmt(Client),
            ];

            for stmt in stmts {
                manager.drop_table(stmt).await?;
            }

            Ok(())
        }
    }
}
