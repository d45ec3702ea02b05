use rand::seq::SliceRandom;

const THEMES: &[&str] = &[
    "slow morning",
    "small adventure",
    "learning something new",
    "tidying and resetting",
    "catching up with friends",
    "creative project",
    "nature walk",
    "treat yourself",
    "quiet reading",
    "cooking experiment",
];

const MOOD_COLORS: &[&str] = &[
    "soft blue",
    "sunny yellow",
    "mint green",
    "warm coral",
    "lavender",
    "charcoal grey",
    "peach",
    "deep burgundy",
];

const OUTFIT_STYLES: &[&str] = &[
    "minimalist",
    "sporty casual",
    "vintage",
    "smart casual",
    "streetwear",
    "cosy knitwear",
    "elegant",
    "preppy",
    "bohemian",
];

const SCHEDULE_TYPES: &[&str] = &[
    "homebody day",
    "out and about",
    "productive work day",
    "social day",
    "rest and recharge",
    "errands and chores",
    "spontaneous day",
];

/// Random creative constraints that keep consecutive days from converging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variety {
    pub daily_theme: &'static str,
    pub mood_color: &'static str,
    pub outfit_style: &'static str,
    pub schedule_type: &'static str,
}

impl Variety {
    pub fn pick() -> Self {
        let mut rng = rand::thread_rng();
        let mut one = |pool: &[&'static str]| pool.choose(&mut rng).copied().unwrap_or_default();
        Self {
            daily_theme: one(THEMES),
            mood_color: one(MOOD_COLORS),
            outfit_style: one(OUTFIT_STYLES),
            schedule_type: one(SCHEDULE_TYPES),
        }
    }
}
