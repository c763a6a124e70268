use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// 默认配置
/// - 单号限额：standard / rambolito 各 10,000
/// - 奖金倍数：standard 450x；rambolito 组六 75x、对子 150x
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        let limits_sql = r#"
INSERT INTO bet_limits (bet_type, limit_amount, is_active)
VALUES
 ('standard', 10000.00, TRUE),
 ('rambolito', 10000.00, TRUE)
ON CONFLICT (bet_type) DO NOTHING;
"#;
        conn.execute(Statement::from_string(
            manager.get_database_backend(),
            limits_sql.to_string(),
        ))
        .await?;

        let prizes_sql = r#"
INSERT INTO prize_configurations (bet_type, multiplier, double_multiplier, is_active)
VALUES
 ('standard', 450.00, NULL, TRUE),
 ('rambolito', 75.00, 150.00, TRUE)
ON CONFLICT (bet_type) DO NOTHING;
"#;
        conn.execute(Statement::from_string(
            manager.get_database_backend(),
            prizes_sql.to_string(),
        ))
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        for sql in ["DELETE FROM prize_configurations", "DELETE FROM bet_limits"] {
            conn.execute(Statement::from_string(
                manager.get_database_backend(),
                sql.to_string(),
            ))
            .await?;
        }
        Ok(())
    }
}
