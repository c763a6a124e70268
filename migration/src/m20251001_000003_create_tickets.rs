use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Draws {
    Table,
    Id,
}

/// 票据；ticket_number 为 17 位纯数字
#[derive(DeriveIden)]
enum Tickets {
    Table,
    Id,
    TicketNumber,
    UserId,
    DrawId,
    TotalAmount,
    Status,
    IdempotencyKey,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Bets {
    Table,
    Id,
    TicketId,
    BetType,
    BetCombination,
    BetAmount,
    Sequence,
}

#[derive(DeriveIden)]
enum WinningTickets {
    Table,
    Id,
    TicketId,
    DrawId,
    PrizeAmount,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tickets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tickets::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tickets::TicketNumber).string_len(17).not_null())
                    .col(ColumnDef::new(Tickets::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Tickets::DrawId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Tickets::TotalAmount)
                            .decimal_len(14, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tickets::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Tickets::IdempotencyKey).string_len(128).null())
                    .col(
                        ColumnDef::new(Tickets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Tickets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tickets_draw")
                            .from(Tickets::Table, Tickets::DrawId)
                            .to(Draws::Table, Draws::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tickets_number_unique")
                    .table(Tickets::Table)
                    .col(Tickets::TicketNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // NULL 幂等键互不冲突
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tickets_user_idempotency_unique")
                    .table(Tickets::Table)
                    .col(Tickets::UserId)
                    .col(Tickets::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tickets_draw_user")
                    .table(Tickets::Table)
                    .col(Tickets::DrawId)
                    .col(Tickets::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Bets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Bets::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Bets::TicketId).big_integer().not_null())
                    .col(ColumnDef::new(Bets::BetType).string_len(16).not_null())
                    .col(ColumnDef::new(Bets::BetCombination).string_len(3).not_null())
                    .col(
                        ColumnDef::new(Bets::BetAmount)
                            .decimal_len(14, 2)
                            .not_null()
                            .check(Expr::col(Bets::BetAmount).gt(0)),
                    )
                    .col(ColumnDef::new(Bets::Sequence).string_len(4).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bets_ticket")
                            .from(Bets::Table, Bets::TicketId)
                            .to(Tickets::Table, Tickets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bets_ticket")
                    .table(Bets::Table)
                    .col(Bets::TicketId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WinningTickets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WinningTickets::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WinningTickets::TicketId).big_integer().not_null())
                    .col(ColumnDef::new(WinningTickets::DrawId).big_integer().not_null())
                    .col(
                        ColumnDef::new(WinningTickets::PrizeAmount)
                            .decimal_len(16, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WinningTickets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_winning_tickets_ticket")
                            .from(WinningTickets::Table, WinningTickets::TicketId)
                            .to(Tickets::Table, Tickets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // 每张票最多一条中奖记录
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_winning_tickets_ticket_unique")
                    .table(WinningTickets::Table)
                    .col(WinningTickets::TicketId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 删除顺序：中奖 -> 投注 -> 票据
        manager
            .drop_table(Table::drop().if_exists().table(WinningTickets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Bets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Tickets::Table).to_owned())
            .await?;
        Ok(())
    }
}
