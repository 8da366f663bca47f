//! Weighted-random list generation.
//!
//! Each draw first picks a rarity tier present in the hub, weighted by the
//! configured [`RarityWeights`], then a provision uniformly within that tier.
//! Repeated picks of the same provision collapse into one line whose count is
//! the number of picks, ordered by first selection.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::errors::AppError;
use crate::models::{GeneratedList, ListItem, Provision, Rarity, ResourceHub};

/// Hard ceiling on draws per list, for both config and per-request overrides.
pub const MAX_DRAWS: usize = 100;

/// Relative selection weight per rarity tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarityWeights {
    weights: [u32; 5],
}

impl Default for RarityWeights {
    fn default() -> Self {
        Self {
            weights: [60, 25, 10, 4, 1],
        }
    }
}

impl RarityWeights {
    pub fn weight(&self, rarity: Rarity) -> u32 {
        self.weights[Self::slot(rarity)]
    }

    /// Return a copy with one tier's weight replaced.
    pub fn with(mut self, rarity: Rarity, weight: u32) -> Self {
        self.weights[Self::slot(rarity)] = weight;
        self
    }

    /// Parse `tier=weight` pairs separated by commas, e.g. `common=60,rare=10`.
    ///
    /// Tiers not mentioned keep their default weight.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let mut weights = Self::default();

        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (tier, value) = pair.split_once('=').ok_or_else(|| {
                AppError::Validation(format!("Expected tier=weight, got {:?}", pair))
            })?;
            let rarity = Rarity::parse(tier)
                .ok_or_else(|| AppError::Validation(format!("Unknown rarity {:?}", tier)))?;
            let weight = value.trim().parse::<u32>().map_err(|_| {
                AppError::Validation(format!("Invalid weight {:?} for {}", value, rarity))
            })?;
            weights = weights.with(rarity, weight);
        }

        if weights.weights.iter().all(|w| *w == 0) {
            return Err(AppError::Validation(
                "At least one rarity weight must be positive".to_string(),
            ));
        }

        Ok(weights)
    }

    fn slot(rarity: Rarity) -> usize {
        match rarity {
            Rarity::Common => 0,
            Rarity::Uncommon => 1,
            Rarity::Rare => 2,
            Rarity::VeryRare => 3,
            Rarity::Legendary => 4,
        }
    }
}

/// Inclusive bounds for the random number of draws per list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    pub min: usize,
    pub max: usize,
}

impl Default for DrawRange {
    fn default() -> Self {
        Self { min: 3, max: 10 }
    }
}

impl DrawRange {
    pub fn new(min: usize, max: usize) -> Result<Self, AppError> {
        if min == 0 || min > max || max > MAX_DRAWS {
            return Err(AppError::Validation(format!(
                "Draw bounds must satisfy 1 <= min <= max <= {}, got {}..={}",
                MAX_DRAWS, min, max
            )));
        }
        Ok(Self { min, max })
    }
}

/// Produces [`GeneratedList`]s from hubs. Holds no state besides its policy.
#[derive(Debug, Clone, Default)]
pub struct ListGenerator {
    weights: RarityWeights,
    draws: DrawRange,
}

impl ListGenerator {
    pub fn new(weights: RarityWeights, draws: DrawRange) -> Self {
        Self { weights, draws }
    }

    /// Generate a list using the thread-local RNG.
    pub fn generate(
        &self,
        hub: &ResourceHub,
        draws: Option<usize>,
    ) -> Result<GeneratedList, AppError> {
        self.generate_with(hub, draws, &mut rand::thread_rng())
    }

    /// Generate a list from `hub`, drawing `draws` times (or a random count within
    /// the configured range when `None`).
    pub fn generate_with<R: Rng + ?Sized>(
        &self,
        hub: &ResourceHub,
        draws: Option<usize>,
        rng: &mut R,
    ) -> Result<GeneratedList, AppError> {
        if hub.provisions.is_empty() {
            return Err(AppError::Validation(format!(
                "Resource hub {} has no provisions",
                hub.name
            )));
        }

        let draw_count = match draws {
            Some(n) if (1..=MAX_DRAWS).contains(&n) => n,
            Some(n) => {
                return Err(AppError::Validation(format!(
                    "draws must be between 1 and {}, got {}",
                    MAX_DRAWS, n
                )))
            }
            None => rng.gen_range(self.draws.min..=self.draws.max),
        };

        let mut buckets: BTreeMap<Rarity, Vec<&Provision>> = BTreeMap::new();
        for provision in &hub.provisions {
            if self.weights.weight(provision.rarity) > 0 {
                buckets.entry(provision.rarity).or_default().push(provision);
            }
        }
        if buckets.is_empty() {
            return Err(AppError::Validation(format!(
                "Resource hub {} has no provisions with a positive rarity weight",
                hub.name
            )));
        }

        let tiers: Vec<&Vec<&Provision>> = buckets.values().collect();
        // Summed in u64 so any table of u32 weights fits.
        let tier_index =
            WeightedIndex::new(buckets.keys().map(|r| u64::from(self.weights.weight(*r))))
            .map_err(|e| AppError::Internal(format!("Invalid rarity weights: {}", e)))?;

        let mut items: Vec<ListItem> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for _ in 0..draw_count {
            let tier = tiers[tier_index.sample(rng)];
            let provision = tier[rng.gen_range(0..tier.len())];

            match positions.get(provision.id.as_str()) {
                Some(&pos) => items[pos].count += 1,
                None => {
                    positions.insert(provision.id.as_str(), items.len());
                    items.push(ListItem {
                        provision_id: provision.id.clone(),
                        name: provision.name.clone(),
                        rarity: provision.rarity,
                        price: provision.price,
                        count: 1,
                    });
                }
            }
        }

        tracing::debug!(
            hub_id = %hub.id,
            draws = draw_count,
            lines = items.len(),
            "Generated list"
        );

        Ok(GeneratedList {
            id: uuid::Uuid::new_v4().to_string(),
            hub_id: hub.id.clone(),
            hub_name: hub.name.clone(),
            items,
            timestamp: Utc::now(),
        })
    }
}
