use sea_orm_migration::prelude::*;

/// 开奖场次：每天 2PM / 5PM / 9PM 三场
#[derive(DeriveIden)]
enum Draws {
    Table,
    Id,
    DrawDate,
    TimeSlot,
    Status,
    CutoffAt,
    WinningNumber,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DrawResults {
    Table,
    Id,
    DrawId,
    WinningNumber,
    IsOfficial,
    CreatedAt,
}

/// 全局单号限额（按玩法）
#[derive(DeriveIden)]
enum BetLimits {
    Table,
    Id,
    BetType,
    LimitAmount,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

/// 单场单号限额覆盖
#[derive(DeriveIden)]
enum BetLimitsPerDraw {
    Table,
    Id,
    DrawId,
    BetCombination,
    BetType,
    LimitAmount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PrizeConfigurations {
    Table,
    Id,
    BetType,
    Multiplier,
    DoubleMultiplier,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

/// 单场单号累计投注额
#[derive(DeriveIden)]
enum CurrentBetTotals {
    Table,
    Id,
    DrawId,
    BetCombination,
    BetType,
    TotalAmount,
    TicketCount,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

fn id_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn timestamp_col<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::cust("NOW()"))
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Draws::Table)
                    .if_not_exists()
                    .col(&mut id_col(Draws::Id))
                    .col(ColumnDef::new(Draws::DrawDate).date().not_null())
                    .col(ColumnDef::new(Draws::TimeSlot).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Draws::Status)
                            .string_len(16)
                            .not_null()
                            .default("open"),
                    )
                    .col(
                        ColumnDef::new(Draws::CutoffAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Draws::WinningNumber).string_len(3).null())
                    .col(&mut timestamp_col(Draws::CreatedAt))
                    .col(&mut timestamp_col(Draws::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_draws_date_slot_unique")
                    .table(Draws::Table)
                    .col(Draws::DrawDate)
                    .col(Draws::TimeSlot)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DrawResults::Table)
                    .if_not_exists()
                    .col(&mut id_col(DrawResults::Id))
                    .col(ColumnDef::new(DrawResults::DrawId).big_integer().not_null())
                    .col(ColumnDef::new(DrawResults::WinningNumber).string_len(3).not_null())
                    .col(
                        ColumnDef::new(DrawResults::IsOfficial)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(&mut timestamp_col(DrawResults::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_draw_results_draw")
                            .from(DrawResults::Table, DrawResults::DrawId)
                            .to(Draws::Table, Draws::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_draw_results_draw_unique")
                    .table(DrawResults::Table)
                    .col(DrawResults::DrawId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BetLimits::Table)
                    .if_not_exists()
                    .col(&mut id_col(BetLimits::Id))
                    .col(ColumnDef::new(BetLimits::BetType).string_len(16).not_null())
                    .col(
                        ColumnDef::new(BetLimits::LimitAmount)
                            .decimal_len(14, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BetLimits::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(&mut timestamp_col(BetLimits::CreatedAt))
                    .col(&mut timestamp_col(BetLimits::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bet_limits_type_unique")
                    .table(BetLimits::Table)
                    .col(BetLimits::BetType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BetLimitsPerDraw::Table)
                    .if_not_exists()
                    .col(&mut id_col(BetLimitsPerDraw::Id))
                    .col(ColumnDef::new(BetLimitsPerDraw::DrawId).big_integer().not_null())
                    .col(
                        ColumnDef::new(BetLimitsPerDraw::BetCombination)
                            .string_len(3)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BetLimitsPerDraw::BetType).string_len(16).not_null())
                    .col(
                        ColumnDef::new(BetLimitsPerDraw::LimitAmount)
                            .decimal_len(14, 2)
                            .not_null(),
                    )
                    .col(&mut timestamp_col(BetLimitsPerDraw::CreatedAt))
                    .col(&mut timestamp_col(BetLimitsPerDraw::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bet_limits_per_draw_unique")
                    .table(BetLimitsPerDraw::Table)
                    .col(BetLimitsPerDraw::DrawId)
                    .col(BetLimitsPerDraw::BetCombination)
                    .col(BetLimitsPerDraw::BetType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PrizeConfigurations::Table)
                    .if_not_exists()
                    .col(&mut id_col(PrizeConfigurations::Id))
                    .col(ColumnDef::new(PrizeConfigurations::BetType).string_len(16).not_null())
                    .col(
                        ColumnDef::new(PrizeConfigurations::Multiplier)
                            .decimal_len(10, 2)
                            .not_null(),
                    )
                    // 仅组选对子使用
                    .col(
                        ColumnDef::new(PrizeConfigurations::DoubleMultiplier)
                            .decimal_len(10, 2)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PrizeConfigurations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(&mut timestamp_col(PrizeConfigurations::CreatedAt))
                    .col(&mut timestamp_col(PrizeConfigurations::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_prize_configurations_type_unique")
                    .table(PrizeConfigurations::Table)
                    .col(PrizeConfigurations::BetType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CurrentBetTotals::Table)
                    .if_not_exists()
                    .col(&mut id_col(CurrentBetTotals::Id))
                    .col(ColumnDef::new(CurrentBetTotals::DrawId).big_integer().not_null())
                    .col(
                        ColumnDef::new(CurrentBetTotals::BetCombination)
                            .string_len(3)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CurrentBetTotals::BetType).string_len(16).not_null())
                    .col(
                        ColumnDef::new(CurrentBetTotals::TotalAmount)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0)
                            .check(Expr::col(CurrentBetTotals::TotalAmount).gte(0)),
                    )
                    .col(
                        ColumnDef::new(CurrentBetTotals::TicketCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(&mut timestamp_col(CurrentBetTotals::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_current_bet_totals_draw")
                            .from(CurrentBetTotals::Table, CurrentBetTotals::DrawId)
                            .to(Draws::Table, Draws::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // 购票时 ON CONFLICT 依赖此唯一索引
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_current_bet_totals_unique")
                    .table(CurrentBetTotals::Table)
                    .col(CurrentBetTotals::DrawId)
                    .col(CurrentBetTotals::BetCombination)
                    .col(CurrentBetTotals::BetType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(CurrentBetTotals::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(PrizeConfigurations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(BetLimitsPerDraw::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(BetLimits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(DrawResults::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Draws::Table).to_owned())
            .await?;
        Ok(())
    }
}
