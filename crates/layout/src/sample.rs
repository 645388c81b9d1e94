//! Deterministic synthetic clan, used when no snapshot can be loaded and as
//! a fixture for property tests.

use crate::model::{Family, Gender, GraphSnapshot, Person};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

const SURNAME: &str = "Nguyễn";
const MALE_NAMES: &[&str] = &[
    "Văn An", "Đức Bình", "Minh Châu", "Quang Dũng", "Hữu Hải", "Văn Khoa", "Thành Long",
    "Công Minh", "Xuân Nam", "Đình Phúc", "Văn Quý", "Trọng Sơn", "Mạnh Tuấn", "Quốc Việt",
];
const FEMALE_NAMES: &[&str] = &[
    "Thị Hoa", "Thị Lan", "Ngọc Mai", "Thu Nga", "Thị Oanh", "Kim Phượng", "Thanh Tâm",
    "Thị Uyên", "Hồng Vân", "Bích Yến",
];
const SPOUSE_SURNAMES: &[&str] = &["Trần", "Lê", "Phạm", "Hoàng", "Vũ", "Đặng", "Bùi"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SampleConfig {
    /// Number of generation rows, founder included.
    pub generations: u32,
    pub max_children: u32,
    /// Chance that a male line member marries.
    pub marriage_rate: f64,
    /// Chance that a married man has a second union.
    pub second_marriage_rate: f64,
    pub founder_birth_year: i32,
    pub seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            generations: 5,
            max_children: 4,
            marriage_rate: 0.85,
            second_marriage_rate: 0.15,
            founder_birth_year: 1850,
            seed: 42,
        }
    }
}

struct Clan {
    rng: StdRng,
    people: Vec<Person>,
    families: Vec<Family>,
}

impl Clan {
    fn pick(&mut self, names: &[&str]) -> String {
        names[self.rng.random_range(0..names.len())].to_string()
    }

    fn add_person(&mut self, name: String, gender: Gender, patrilineal: bool, birth: i32) -> usize {
        let handle = format!("P{:03}", self.people.len() + 1);
        let living = birth >= 1945 && self.rng.random_bool(0.9);
        let death = (!living).then(|| birth + self.rng.random_range(45..=90));
        self.people.push(
            Person::new(handle, name)
                .gender(gender)
                .patrilineal(patrilineal)
                .living(living)
                .years(Some(birth), death),
        );
        self.people.len() - 1
    }

    fn add_union(&mut self, husband: usize, max_children: u32) -> Vec<usize> {
        let family_handle = format!("F{:03}", self.families.len() + 1);
        let birth = self.people[husband].birth_year.unwrap_or_default();

        let wife_name = format!("{} {}", self.pick(SPOUSE_SURNAMES), self.pick(FEMALE_NAMES));
        let wife_birth = birth + self.rng.random_range(-2..=6);
        let wife = self.add_person(wife_name, Gender::Female, false, wife_birth);
        self.people[wife].families.push(family_handle.clone());
        self.people[husband].families.push(family_handle.clone());

        let mut family = Family::new(family_handle.clone())
            .father(self.people[husband].handle.clone())
            .mother(self.people[wife].handle.clone());

        let count = self.rng.random_range(1..=max_children.max(1));
        let mut children = Vec::new();
        let mut child_birth = wife_birth + self.rng.random_range(20..=28);
        for _ in 0..count {
            let son = self.rng.random_bool(0.55);
            let (gender, names) = if son {
                (Gender::Male, MALE_NAMES)
            } else {
                (Gender::Female, FEMALE_NAMES)
            };
            let name = format!("{SURNAME} {}", self.pick(names));
            let child = self.add_person(name, gender, true, child_birth);
            self.people[child].parent_families.push(family_handle.clone());
            family.children.push(self.people[child].handle.clone());
            children.push(child);
            child_birth += self.rng.random_range(1..=4);
        }
        self.families.push(family);
        children
    }
}

/// Generate a patrilineal clan: the founder's sons marry and carry the line,
/// daughters and wives stay leaves. Same config, same snapshot.
pub fn generate_sample(config: &SampleConfig) -> GraphSnapshot {
    let mut clan = Clan {
        rng: StdRng::seed_from_u64(config.seed),
        people: Vec::new(),
        families: Vec::new(),
    };

    let founder_name = format!("{SURNAME} {}", clan.pick(MALE_NAMES));
    let founder = clan.add_person(founder_name, Gender::Male, true, config.founder_birth_year);
    let mut queue = VecDeque::from([(founder, 0u32)]);

    while let Some((person, depth)) = queue.pop_front() {
        if depth + 1 >= config.generations || clan.people[person].gender != Gender::Male {
            continue;
        }
        if person != founder && !clan.rng.random_bool(config.marriage_rate.clamp(0.0, 1.0)) {
            continue;
        }
        let mut children = clan.add_union(person, config.max_children);
        if clan.rng.random_bool(config.second_marriage_rate.clamp(0.0, 1.0)) {
            children.extend(clan.add_union(person, config.max_children));
        }
        queue.extend(children.into_iter().map(|c| (c, depth + 1)));
    }

    debug!(
        seed = config.seed,
        people = clan.people.len(),
        families = clan.families.len(),
        "generated sample clan"
    );
    GraphSnapshot::new(clan.people, clan.families)
}
