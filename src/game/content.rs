use std::fmt;

use once_cell::sync::Lazy;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::state::{Boss, Card, CardType, Rarity, MAX_STAGE};
use crate::utils::make_id;

/// 稀有度累计分布（上界，含下界不含上界），骰子范围 [0, 100)。
const RARITY_LADDER: [(f64, Rarity); 5] = [
    (60.0, Rarity::Common),
    (90.0, Rarity::Uncommon),
    (95.0, Rarity::Rare),
    (98.0, Rarity::Legendary),
    (100.0, Rarity::Secret),
];

const STARTER_COMMONS: usize = 3;
const STARTER_UNCOMMONS: usize = 2;
pub const DEFAULT_LOOTBOX_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardTemplate {
    pub name: &'static str,
    pub card_type: CardType,
    pub rarity: Rarity,
    pub atk: u32,
    pub hp: u32,
    pub def: u32,
    pub crit_rate: u8,
    pub cost: u32,
    pub description: &'static str,
}

impl CardTemplate {
    fn instantiate(&self, id: String) -> Card {
        Card {
            id,
            name: self.name.to_string(),
            card_type: self.card_type,
            rarity: self.rarity,
            atk: self.atk,
            hp: self.hp,
            def: self.def,
            crit_rate: self.crit_rate,
            cost: self.cost,
            description: self.description.to_string(),
            image: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BossTemplate {
    pub name: &'static str,
    pub atk: u32,
    pub def: u32,
    pub rarity: Rarity,
    pub stage: u8,
    pub image: &'static str,
    pub description: &'static str,
}

pub const CARD_TEMPLATES: [CardTemplate; 15] = [
    CardTemplate {
        name: "Memory Shard",
        card_type: CardType::Attack,
        rarity: Rarity::Common,
        atk: 8,
        hp: 20,
        def: 2,
        crit_rate: 10,
        cost: 1,
        description: "A fragment of forgotten power.",
    },
    CardTemplate {
        name: "Echo Blade",
        card_type: CardType::Attack,
        rarity: Rarity::Common,
        atk: 12,
        hp: 15,
        def: 0,
        crit_rate: 15,
        cost: 1,
        description: "Strikes twice in memory.",
    },
    CardTemplate {
        name: "Fading Shield",
        card_type: CardType::Skill,
        rarity: Rarity::Common,
        atk: 4,
        hp: 30,
        def: 8,
        crit_rate: 5,
        cost: 1,
        description: "Protection from times past.",
    },
    CardTemplate {
        name: "Phantom Strike",
        card_type: CardType::Attack,
        rarity: Rarity::Common,
        atk: 10,
        hp: 18,
        def: 3,
        crit_rate: 12,
        cost: 1,
        description: "A ghostly attack from nowhere.",
    },
    CardTemplate {
        name: "Void Walker",
        card_type: CardType::Attack,
        rarity: Rarity::Uncommon,
        atk: 18,
        hp: 25,
        def: 5,
        crit_rate: 20,
        cost: 2,
        description: "Traverses the space between memories.",
    },
    CardTemplate {
        name: "Time Fracture",
        card_type: CardType::Skill,
        rarity: Rarity::Uncommon,
        atk: 14,
        hp: 35,
        def: 10,
        crit_rate: 15,
        cost: 2,
        description: "Breaks the flow of time itself.",
    },
    CardTemplate {
        name: "Crystal Resonance",
        card_type: CardType::Skill,
        rarity: Rarity::Uncommon,
        atk: 10,
        hp: 40,
        def: 12,
        crit_rate: 10,
        cost: 2,
        description: "Harmonic defense from crystallized memories.",
    },
    CardTemplate {
        name: "Neon Cutter",
        card_type: CardType::Attack,
        rarity: Rarity::Uncommon,
        atk: 22,
        hp: 20,
        def: 2,
        crit_rate: 25,
        cost: 2,
        description: "Slices through reality with light.",
    },
    CardTemplate {
        name: "Oblivion Surge",
        card_type: CardType::Attack,
        rarity: Rarity::Rare,
        atk: 30,
        hp: 35,
        def: 8,
        crit_rate: 30,
        cost: 3,
        description: "Unleash the power of forgotten worlds.",
    },
    CardTemplate {
        name: "Eternal Guard",
        card_type: CardType::Skill,
        rarity: Rarity::Rare,
        atk: 15,
        hp: 60,
        def: 20,
        crit_rate: 10,
        cost: 3,
        description: "An unbreakable shield from eternity.",
    },
    CardTemplate {
        name: "Crimson Echo",
        card_type: CardType::Attack,
        rarity: Rarity::Rare,
        atk: 35,
        hp: 30,
        def: 5,
        crit_rate: 35,
        cost: 3,
        description: "The last cry of a dying memory.",
    },
    CardTemplate {
        name: "Void Emperor",
        card_type: CardType::Attack,
        rarity: Rarity::Legendary,
        atk: 50,
        hp: 50,
        def: 15,
        crit_rate: 40,
        cost: 4,
        description: "Ruler of the emptiness between worlds.",
    },
    CardTemplate {
        name: "Time Lord's Blessing",
        card_type: CardType::Skill,
        rarity: Rarity::Legendary,
        atk: 25,
        hp: 80,
        def: 30,
        crit_rate: 20,
        cost: 4,
        description: "Gift from the master of time itself.",
    },
    CardTemplate {
        name: "The Last Memory",
        card_type: CardType::Relic,
        rarity: Rarity::Secret,
        atk: 75,
        hp: 100,
        def: 25,
        crit_rate: 50,
        cost: 5,
        description: "The final fragment of all existence.",
    },
    // 诅咒牌只会从通用卡池中抽到
    CardTemplate {
        name: "Corrupted Echo",
        card_type: CardType::Curse,
        rarity: Rarity::Common,
        atk: 5,
        hp: 10,
        def: 0,
        crit_rate: 0,
        cost: 0,
        description: "A tainted memory that weakens your deck.",
    },
];

pub const BOSS_TEMPLATES: [BossTemplate; 8] = [
    BossTemplate {
        name: "Shadow Fragment",
        atk: 15,
        def: 5,
        rarity: Rarity::Common,
        stage: 1,
        image: "assets/boss-shadow-fragment.png",
        description: "A shard of darkness given form. The weakest of the void creatures.",
    },
    BossTemplate {
        name: "Memory Wraith",
        atk: 20,
        def: 8,
        rarity: Rarity::Common,
        stage: 2,
        image: "assets/boss-memory-wraith.png",
        description: "A spectral being born from forgotten memories.",
    },
    BossTemplate {
        name: "Void Sentinel",
        atk: 28,
        def: 12,
        rarity: Rarity::Uncommon,
        stage: 3,
        image: "assets/boss-void-sentinel.png",
        description: "Guardian of the void, forged from darkness and steel.",
    },
    BossTemplate {
        name: "Time Devourer",
        atk: 35,
        def: 15,
        rarity: Rarity::Uncommon,
        stage: 4,
        image: "assets/boss-time-devourer.png",
        description: "An eldritch horror that consumes the fabric of time itself.",
    },
    BossTemplate {
        name: "Crimson Nightmare",
        atk: 45,
        def: 20,
        rarity: Rarity::Rare,
        stage: 5,
        image: "assets/boss-crimson-nightmare.png",
        description: "The embodiment of terror, burning with hellfire.",
    },
    BossTemplate {
        name: "Oblivion Lord",
        atk: 55,
        def: 25,
        rarity: Rarity::Rare,
        stage: 6,
        image: "assets/boss-oblivion-lord.png",
        description: "Ancient god of the void, wielder of cosmic power.",
    },
    BossTemplate {
        name: "The Forgotten King",
        atk: 70,
        def: 30,
        rarity: Rarity::Legendary,
        stage: 7,
        image: "assets/boss-forgotten-king.png",
        description: "Once a great ruler, now an undead monarch seeking vengeance.",
    },
    BossTemplate {
        name: "Eternal Void",
        atk: 100,
        def: 40,
        rarity: Rarity::Secret,
        stage: 8,
        image: "assets/boss-eternal-void.png",
        description: "The ultimate darkness. The end of all existence.",
    },
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ContentError {
    MissingRarity { rarity: Rarity },
    EmptyStarterPool { rarity: Rarity },
    MissingStage { stage: u8 },
}

impl fmt::Display for ContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentError::MissingRarity { rarity } => {
                write!(f, "no card template for rarity {}", rarity.as_str())
            }
            ContentError::EmptyStarterPool { rarity } => {
                write!(f, "starter pool for rarity {} is empty", rarity.as_str())
            }
            ContentError::MissingStage { stage } => {
                write!(f, "no boss template for stage {stage}")
            }
        }
    }
}

impl std::error::Error for ContentError {}

static TEMPLATE_COVERAGE: Lazy<Result<(), ContentError>> = Lazy::new(verify_template_coverage);

/// 检查静态模板是否覆盖全部稀有度、新手卡池和 1..=8 关。
pub fn verify_template_coverage() -> Result<(), ContentError> {
    for rarity in Rarity::ALL {
        if templates_of(rarity).next().is_none() {
            return Err(ContentError::MissingRarity { rarity });
        }
    }
    if starter_commons().is_empty() {
        return Err(ContentError::EmptyStarterPool {
            rarity: Rarity::Common,
        });
    }
    if templates_of(Rarity::Uncommon).next().is_none() {
        return Err(ContentError::EmptyStarterPool {
            rarity: Rarity::Uncommon,
        });
    }
    for stage in 1..=MAX_STAGE {
        if boss_template(stage).is_none() {
            return Err(ContentError::MissingStage { stage });
        }
    }
    Ok(())
}

/// 进程内只校验一次。
pub fn ensure_template_coverage() -> Result<(), ContentError> {
    TEMPLATE_COVERAGE.clone()
}

pub fn roll_rarity(roll: f64) -> Rarity {
    RARITY_LADDER
        .iter()
        .find(|(upper, _)| roll < *upper)
        .map(|(_, rarity)| *rarity)
        .unwrap_or(Rarity::Secret)
}

pub fn boss_max_hp(stage: u8) -> u32 {
    50 + 30 * stage as u32
}

pub fn boss_template(stage: u8) -> Option<&'static BossTemplate> {
    BOSS_TEMPLATES.iter().find(|template| template.stage == stage)
}

fn templates_of(rarity: Rarity) -> impl Iterator<Item = &'static CardTemplate> {
    CARD_TEMPLATES
        .iter()
        .filter(move |template| template.rarity == rarity)
}

fn starter_commons() -> Vec<&'static CardTemplate> {
    templates_of(Rarity::Common)
        .filter(|template| template.card_type != CardType::Curse)
        .collect()
}

/// 卡牌与 Boss 的随机生成器，持有唯一的随机源。
pub struct ContentGenerator {
    rng: SmallRng,
}

impl ContentGenerator {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn rng_mut(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    pub fn generate_boss(&mut self, stage: u8) -> Boss {
        let template = match boss_template(stage) {
            Some(template) => template,
            None => {
                log::warn!("no boss template for stage {stage}, using stage 1 template");
                &BOSS_TEMPLATES[0]
            }
        };
        let max_hp = boss_max_hp(stage);

        Boss {
            id: make_id("boss", &mut self.rng),
            name: template.name.to_string(),
            hp: max_hp,
            max_hp,
            atk: template.atk,
            def: template.def,
            rarity: template.rarity,
            stage: template.stage,
            image: Some(template.image.to_string()),
            description: Some(template.description.to_string()),
        }
    }

    pub fn generate_card(&mut self) -> Card {
        let roll = self.rng.gen::<f64>() * 100.0;
        let rarity = roll_rarity(roll);
        let pool: Vec<&CardTemplate> = templates_of(rarity).collect();
        let template = match pool.choose(&mut self.rng) {
            Some(template) => *template,
            None => {
                log::error!("no card template for rarity {}", rarity.as_str());
                &CARD_TEMPLATES[0]
            }
        };
        template.instantiate(make_id("card", &mut self.rng))
    }

    /// 新手牌组：3 张非诅咒普通牌 + 2 张罕见牌，允许重复。
    pub fn generate_starter_deck(&mut self) -> Vec<Card> {
        let commons = starter_commons();
        let uncommons: Vec<&CardTemplate> = templates_of(Rarity::Uncommon).collect();

        let mut deck = Vec::with_capacity(STARTER_COMMONS + STARTER_UNCOMMONS);
        for (pool, count) in [(&commons, STARTER_COMMONS), (&uncommons, STARTER_UNCOMMONS)] {
            for _ in 0..count {
                if let Some(template) = pool.choose(&mut self.rng) {
                    let id = make_id("card", &mut self.rng);
                    deck.push(template.instantiate(id));
                }
            }
        }
        deck
    }

    pub fn generate_lootbox_cards(&mut self, count: usize) -> Vec<Card> {
        (0..count).map(|_| self.generate_card()).collect()
    }
}

impl Default for ContentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn templates_cover_every_rarity_and_stage() {
        assert_eq!(verify_template_coverage(), Ok(()));
        assert_eq!(ensure_template_coverage(), Ok(()));
    }

    #[test]
    fn boss_hp_follows_stage_formula() {
        let mut generator = ContentGenerator::with_seed(1);
        for stage in 1..=MAX_STAGE {
            let boss = generator.generate_boss(stage);
            assert_eq!(boss.max_hp, 50 + 30 * stage as u32);
            assert_eq!(boss.hp, boss.max_hp);
            assert_eq!(boss.stage, stage);
            assert_eq!(boss.name, BOSS_TEMPLATES[stage as usize - 1].name);
        }
    }

    #[test]
    fn unknown_stage_falls_back_to_first_template() {
        let mut generator = ContentGenerator::with_seed(1);
        let boss = generator.generate_boss(9);
        assert_eq!(boss.name, "Shadow Fragment");
        assert_eq!(boss.max_hp, 320);
        assert_eq!(boss.hp, 320);
    }

    #[test]
    fn rarity_ladder_boundaries() {
        assert_eq!(roll_rarity(0.0), Rarity::Common);
        assert_eq!(roll_rarity(59.999), Rarity::Common);
        assert_eq!(roll_rarity(60.0), Rarity::Uncommon);
        assert_eq!(roll_rarity(89.999), Rarity::Uncommon);
        assert_eq!(roll_rarity(90.0), Rarity::Rare);
        assert_eq!(roll_rarity(95.0), Rarity::Legendary);
        assert_eq!(roll_rarity(98.0), Rarity::Secret);
        assert_eq!(roll_rarity(99.999), Rarity::Secret);
    }

    #[test]
    fn card_rarity_distribution_matches_ladder() {
        let mut generator = ContentGenerator::with_seed(2024);
        let draws = 10_000;
        let mut counts: HashMap<Rarity, usize> = HashMap::new();
        for _ in 0..draws {
            *counts.entry(generator.generate_card().rarity).or_default() += 1;
        }

        let expected = [
            (Rarity::Common, 60.0, 2.5),
            (Rarity::Uncommon, 30.0, 2.5),
            (Rarity::Rare, 5.0, 1.2),
            (Rarity::Legendary, 3.0, 1.0),
            (Rarity::Secret, 2.0, 0.9),
        ];
        for (rarity, percent, tolerance) in expected {
            let share = *counts.get(&rarity).unwrap_or(&0) as f64 * 100.0 / draws as f64;
            assert!(
                (share - percent).abs() <= tolerance,
                "{} share {share:.2}% too far from {percent}%",
                rarity.as_str()
            );
        }
    }

    #[test]
    fn starter_deck_is_three_commons_and_two_uncommons() {
        let mut generator = ContentGenerator::with_seed(9);
        for _ in 0..50 {
            let deck = generator.generate_starter_deck();
            assert_eq!(deck.len(), 5);
            assert!(deck[..3]
                .iter()
                .all(|card| card.rarity == Rarity::Common && !card.is_curse()));
            assert!(deck[3..].iter().all(|card| card.rarity == Rarity::Uncommon));
        }
    }

    #[test]
    fn lootbox_draws_requested_count_with_fresh_ids() {
        let mut generator = ContentGenerator::with_seed(3);
        let cards = generator.generate_lootbox_cards(DEFAULT_LOOTBOX_SIZE);
        assert_eq!(cards.len(), 3);
        assert_ne!(cards[0].id, cards[1].id);
        assert_ne!(cards[1].id, cards[2].id);
    }
}
