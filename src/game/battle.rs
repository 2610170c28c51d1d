use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::{BattleLogEntry, Boss, Card, LogKind};

/// 胜利奖励参数，默认 20 + 10 × 关卡。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RewardTable {
    pub base: u32,
    pub per_stage: u32,
}

impl RewardTable {
    pub fn reward_for(&self, stage: u8) -> u32 {
        self.base
            .saturating_add(self.per_stage.saturating_mul(stage as u32))
    }
}

impl Default for RewardTable {
    fn default() -> Self {
        Self {
            base: 20,
            per_stage: 10,
        }
    }
}

/// 一次出战的结算结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BattleResolution {
    pub boss: Boss,
    pub log: Vec<BattleLogEntry>,
    pub victory: bool,
    pub total_damage: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<u32>,
}

pub fn card_damage(card: &Card, boss: &Boss, crit: bool) -> u32 {
    let base = card.atk.saturating_sub(boss.def);
    if crit {
        base.saturating_mul(2)
    } else {
        base
    }
}

pub fn roll_crit<R: Rng + ?Sized>(card: &Card, rng: &mut R) -> bool {
    rng.gen::<f64>() * 100.0 < card.crit_rate as f64
}

/// 三张牌同时攻击 Boss；调用方保证恰好选了三张。
pub fn resolve_battle<R: Rng + ?Sized>(
    cards: &[Card],
    boss: &Boss,
    stage: u8,
    rewards: &RewardTable,
    rng: &mut R,
) -> BattleResolution {
    let mut updated = boss.clone();
    let mut log = Vec::with_capacity(cards.len() + 3);
    let mut total_damage: u32 = 0;

    for card in cards {
        let crit = roll_crit(card, rng);
        let damage = card_damage(card, boss, crit);
        let entry = if crit {
            BattleLogEntry::new(LogKind::Crit, format!("{} CRITICAL HIT!", card.name))
        } else {
            BattleLogEntry::new(LogKind::Attack, format!("{} attacks!", card.name))
        };
        log.push(entry.with_value(damage));
        total_damage = total_damage.saturating_add(damage);
    }

    updated.apply_damage(total_damage);
    log.push(
        BattleLogEntry::new(LogKind::Damage, format!("Total damage: {total_damage}"))
            .with_value(total_damage),
    );

    if updated.is_defeated() {
        let reward = rewards.reward_for(stage);
        log.push(
            BattleLogEntry::new(
                LogKind::Victory,
                format!("Victory! Boss defeated! +{reward} coins"),
            )
            .with_value(reward),
        );
        BattleResolution {
            boss: updated,
            log,
            victory: true,
            total_damage,
            reward: Some(reward),
        }
    } else {
        // 反击不计玩家防御
        log.push(
            BattleLogEntry::new(
                LogKind::Damage,
                format!("{} strikes back for {} damage!", updated.name, updated.atk),
            )
            .with_value(updated.atk),
        );
        log.push(BattleLogEntry::new(
            LogKind::Defeat,
            format!("Defeat! Boss has {} HP remaining.", updated.hp),
        ));
        BattleResolution {
            boss: updated,
            log,
            victory: false,
            total_damage,
            reward: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{CardType, Rarity};
    use rand::rngs::mock::StepRng;

    fn card(id: &str, atk: u32, crit_rate: u8) -> Card {
        Card {
            id: id.into(),
            name: format!("Card {id}"),
            card_type: CardType::Attack,
            rarity: Rarity::Common,
            atk,
            hp: 10,
            def: 0,
            crit_rate,
            cost: 1,
            description: String::new(),
            image: None,
        }
    }

    fn boss(hp: u32, def: u32) -> Boss {
        Boss {
            id: "boss-test".into(),
            name: "Memory Wraith".into(),
            hp,
            max_hp: hp,
            atk: 20,
            def,
            rarity: Rarity::Common,
            stage: 2,
            image: None,
            description: None,
        }
    }

    // gen::<f64>() 恒为 0，所有暴击率大于 0 的牌都会暴击
    fn always_crit() -> StepRng {
        StepRng::new(0, 0)
    }

    // gen::<f64>() 接近 1，永不暴击
    fn never_crit() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    #[test]
    fn damage_is_atk_minus_def_without_crits() {
        let cards = [card("a", 20, 50), card("b", 12, 50), card("c", 3, 50)];
        let target = boss(200, 5);
        let result = resolve_battle(&cards, &target, 2, &RewardTable::default(), &mut never_crit());

        // 15 + 7 + 0
        assert_eq!(result.total_damage, 22);
        assert_eq!(result.boss.hp, 178);
        assert!(!result.victory);
        assert_eq!(result.reward, None);
        assert_eq!(result.log[0].kind, LogKind::Attack);
        assert_eq!(result.log[0].value, Some(15));
        assert_eq!(result.log[2].value, Some(0));
    }

    #[test]
    fn crits_double_base_damage() {
        let cards = [card("a", 20, 50), card("b", 12, 50), card("c", 10, 0)];
        let target = boss(200, 5);
        let result = resolve_battle(&cards, &target, 2, &RewardTable::default(), &mut always_crit());

        // 30 + 14 + 5 (暴击率 0 不会暴击)
        assert_eq!(result.total_damage, 49);
        assert_eq!(result.boss.hp, 151);
        assert_eq!(result.log[0].kind, LogKind::Crit);
        assert_eq!(result.log[1].kind, LogKind::Crit);
        assert_eq!(result.log[2].kind, LogKind::Attack);
    }

    #[test]
    fn hp_never_drops_below_zero_and_victory_pays_reward() {
        let cards = [card("a", 60, 0), card("b", 60, 0), card("c", 60, 0)];
        let target = boss(80, 5);
        let result = resolve_battle(&cards, &target, 3, &RewardTable::default(), &mut never_crit());

        assert!(result.victory);
        assert_eq!(result.boss.hp, 0);
        assert_eq!(result.reward, Some(50));
        let last = result.log.last().expect("victory entry");
        assert_eq!(last.kind, LogKind::Victory);
        assert_eq!(last.value, Some(50));
    }

    #[test]
    fn reward_scales_with_stage() {
        let rewards = RewardTable::default();
        for stage in 1..=8u8 {
            assert_eq!(rewards.reward_for(stage), 20 + 10 * stage as u32);
        }
    }

    #[test]
    fn defeat_logs_counter_attack_and_remaining_hp() {
        let cards = [card("a", 6, 0), card("b", 6, 0), card("c", 6, 0)];
        let target = boss(100, 5);
        let result = resolve_battle(&cards, &target, 2, &RewardTable::default(), &mut never_crit());

        assert!(!result.victory);
        let kinds: Vec<LogKind> = result.log.iter().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LogKind::Attack,
                LogKind::Attack,
                LogKind::Attack,
                LogKind::Damage,
                LogKind::Damage,
                LogKind::Defeat
            ]
        );
        assert_eq!(result.log[4].value, Some(20));
        assert_eq!(result.log[5].message, "Defeat! Boss has 97 HP remaining.");
    }

    #[test]
    fn oversized_attack_saturates_instead_of_overflowing() {
        let cards = [
            card("a", u32::MAX, 100),
            card("b", u32::MAX, 100),
            card("c", u32::MAX, 100),
        ];
        let target = boss(500, 0);
        let result = resolve_battle(&cards, &target, 1, &RewardTable::default(), &mut always_crit());

        assert_eq!(result.log[0].value, Some(u32::MAX));
        assert_eq!(result.total_damage, u32::MAX);
        assert!(result.victory);

        let rewards = RewardTable {
            base: u32::MAX - 5,
            per_stage: u32::MAX,
        };
        assert_eq!(rewards.reward_for(8), u32::MAX);
    }

    #[test]
    fn resolution_never_touches_input_boss() {
        let cards = [card("a", 60, 0), card("b", 60, 0), card("c", 60, 0)];
        let target = boss(80, 5);
        let _ = resolve_battle(&cards, &target, 1, &RewardTable::default(), &mut never_crit());
        assert_eq!(target.hp, 80);
    }
}
