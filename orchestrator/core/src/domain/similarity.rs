// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Similarity Ranking
//!
//! Every store ranks with the same metric: cosine distance
//! `1 - cos(a, b)`, in `[0, 2]`, lower is closer. A zero-norm vector sits at
//! distance `1.0` from everything. Ties are broken by `created_at`
//! descending and then by id ascending, which makes the ordering total and
//! therefore identical across repeated queries.

use crate::domain::resource::{Resource, ResourceId, ResourceView};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// What to search around: a raw vector or an existing resource's vector.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityQuery {
    Vector(Vec<f32>),
    Resource(ResourceId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarResource {
    pub resource: ResourceView,
    pub distance: f32,
}

/// Cosine distance between two vectors of equal length.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "dimension mismatch in distance computation");

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    (1.0 - similarity) as f32
}

/// Total order used for ranking: distance, then newest first, then id.
pub fn compare_ranked(a: &(Resource, f32), b: &(Resource, f32)) -> Ordering {
    a.1.total_cmp(&b.1)
        .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        .then_with(|| a.0.id.cmp(&b.0.id))
}

/// Score candidates that already passed the filter and keep the `k` closest.
pub fn rank<'a>(candidates: impl IntoIterator<Item = &'a Resource>, query: &[f32], k: usize) -> Vec<(Resource, f32)> {
    let mut scored: Vec<(Resource, f32)> = candidates
        .into_iter()
        .filter_map(|resource| {
            let vector = resource.vector.as_ref()?;
            if vector.len() != query.len() {
                return None;
            }
            Some((resource.clone(), cosine_distance(query, vector)))
        })
        .collect();

    scored.sort_by(compare_ranked);
    scored.truncate(k);
    scored
}
