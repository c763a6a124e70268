//! Pure betting rules: bet shape validation, winning-set expansion and prize multipliers.
//!
//! Nothing in here touches the store; every function is safe to call from any number of
//! concurrent callers.

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::entities::{BetType, prize_configuration_entity as prize_cfg};
use crate::error::InvalidBet;

/// 号码固定 3 位
pub const COMBINATION_LEN: usize = 3;

/// 三位数字的全部下标排列
const PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// 规范化号码：允许 1-3 位数字，不足 3 位左侧补 0（容忍客户端丢失前导 0）
pub fn normalize_combination(raw: &str) -> Result<String, InvalidBet> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.len() > COMBINATION_LEN
        || !trimmed.chars().all(|c| c.is_ascii_digit())
    {
        return Err(InvalidBet::Combination(raw.to_string()));
    }
    Ok(format!("{trimmed:0>3}"))
}

/// 号码中不同数字的个数 (1 = 豹子, 2 = 对子, 3 = 组六)
pub fn distinct_digits(combination: &str) -> usize {
    combination.chars().collect::<BTreeSet<_>>().len()
}

pub fn is_triple(combination: &str) -> bool {
    combination.len() == COMBINATION_LEN && distinct_digits(combination) == 1
}

/// 校验单注格式，返回规范化后的投注类型与号码
pub fn validate_bet_shape(bet_type: &str, combination: &str) -> Result<(BetType, String), InvalidBet> {
    let combination = normalize_combination(combination)?;
    let bet_type: BetType = bet_type.parse().map_err(InvalidBet::BetType)?;

    // 组选豹子等价于直选，不提供
    if bet_type == BetType::Rambolito && is_triple(&combination) {
        return Err(InvalidBet::RambolitoTriple(combination));
    }
    Ok((bet_type, combination))
}

/// 中奖号码集合
/// - standard: 仅号码本身
/// - rambolito: 所有不同排列（对子 3 个，组六 6 个，豹子为空集）
pub fn expand_winning_set(combination: &str, bet_type: BetType) -> BTreeSet<String> {
    match bet_type {
        BetType::Standard => BTreeSet::from([combination.to_string()]),
        BetType::Rambolito => {
            let digits: Vec<char> = combination.chars().collect();
            if digits.len() != COMBINATION_LEN || is_triple(combination) {
                return BTreeSet::new();
            }
            PERMUTATIONS
                .iter()
                .map(|p| p.iter().map(|&i| digits[i]).collect::<String>())
                .collect()
        }
    }
}

pub fn is_winner(bet_type: BetType, combination: &str, official_number: &str) -> bool {
    expand_winning_set(combination, bet_type).contains(official_number)
}

/// 奖金倍数表
///
/// 以数据库中启用的 `prize_configurations` 为准，没有启用配置的投注类型回落到默认值
/// (standard 450x, rambolito 对子 150x, rambolito 组六 75x)。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeTable {
    pub standard: Decimal,
    pub rambolito_double: Decimal,
    pub rambolito: Decimal,
}

impl Default for PrizeTable {
    fn default() -> Self {
        Self {
            standard: Decimal::from(450),
            rambolito_double: Decimal::from(150),
            rambolito: Decimal::from(75),
        }
    }
}

impl PrizeTable {
    pub fn from_configurations(rows: &[prize_cfg::Model]) -> Self {
        let mut table = PrizeTable::default();
        for row in rows.iter().filter(|r| r.is_active) {
            match row.bet_type {
                BetType::Standard => table.standard = row.multiplier,
                BetType::Rambolito => {
                    table.rambolito = row.multiplier;
                    if let Some(double) = row.double_multiplier {
                        table.rambolito_double = double;
                    }
                }
            }
        }
        table
    }

    pub fn multiplier(&self, bet_type: BetType, combination: &str) -> Decimal {
        match bet_type {
            BetType::Standard => self.standard,
            BetType::Rambolito => match distinct_digits(combination) {
                2 => self.rambolito_double,
                3 => self.rambolito,
                // 豹子不允许组选，不应走到这里
                _ => Decimal::ZERO,
            },
        }
    }
}

pub fn prize_multiplier(bet_type: BetType, combination: &str, table: &PrizeTable) -> Decimal {
    table.multiplier(bet_type, combination)
}
