use sea_orm_migration::prelude::*;

/// 代理预付余额
#[derive(DeriveIden)]
enum AccountBalances {
    Table,
    Id,
    UserId,
    CurrentBalance,
    TotalLoaded,
    TotalUsed,
    CreatedAt,
    UpdatedAt,
}

/// 余额流水（只增不改）
#[derive(DeriveIden)]
enum BalanceTransactions {
    Table,
    Id,
    UserId,
    Amount,
    Kind,
    Description,
    ReferenceId,
    Status,
    BalanceAfter,
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
                    .table(AccountBalances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccountBalances::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AccountBalances::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(AccountBalances::CurrentBalance)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0)
                            // 余额永不为负
                            .check(Expr::col(AccountBalances::CurrentBalance).gte(0)),
                    )
                    .col(
                        ColumnDef::new(AccountBalances::TotalLoaded)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AccountBalances::TotalUsed)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AccountBalances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(AccountBalances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_account_balances_user_unique")
                    .table(AccountBalances::Table)
                    .col(AccountBalances::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BalanceTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BalanceTransactions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BalanceTransactions::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(BalanceTransactions::Amount)
                            .decimal_len(14, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BalanceTransactions::Kind).string_len(16).not_null())
                    .col(
                        ColumnDef::new(BalanceTransactions::Description)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BalanceTransactions::ReferenceId).big_integer().null())
                    .col(
                        ColumnDef::new(BalanceTransactions::Status)
                            .string_len(16)
                            .not_null()
                            .default("completed"),
                    )
                    .col(
                        ColumnDef::new(BalanceTransactions::BalanceAfter)
                            .decimal_len(14, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BalanceTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_balance_transactions_user")
                    .table(BalanceTransactions::Table)
                    .col(BalanceTransactions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_balance_transactions_reference")
                    .table(BalanceTransactions::Table)
                    .col(BalanceTransactions::ReferenceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(BalanceTransactions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(AccountBalances::Table)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
