//! Token Batcher (C4, §4.4). Greedy, sequential, order-preserving packing
//! under a dual constraint (input tokens + output-entity cap + hard cap),
//! implemented as a small state machine per §9's design note rather than a
//! general-purpose bin-packer, since packing order must be stable and
//! deterministic (§8 "Batching deterministic").

use codegraph_ai::{estimate_entity_input_tokens, TokenBudget};
use codegraph_core::{Entity, EntityId};

/// A single LLM batch: the entities to present together, the running
/// input-token estimate, and its position in the overall sequence (§3
/// "Batch").
#[derive(Debug, Clone)]
pub struct Batch {
    pub entities: Vec<Entity>,
    pub estimated_input_tokens: usize,
    pub reserved_output_tokens: usize,
    pub index: usize,
}

/// Aggregate statistics over a packing run (§4.4 "Reports").
#[derive(Debug, Clone)]
pub struct BatchStats {
    pub total_batches: usize,
    pub average_batch_size: f64,
    pub input_utilization_pct: f64,
    pub output_utilization_pct: f64,
    pub dominant_limiter: LimitingConstraint,
    pub oversized_entities: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitingConstraint {
    Input,
    Output,
    HardCap,
    None,
}

struct PackState {
    current: Vec<Entity>,
    input_sum: usize,
    batches: Vec<Batch>,
    next_index: usize,
    input_closures: usize,
    output_closures: usize,
    hard_cap_closures: usize,
    output_tokens_per_entity: usize,
}

impl PackState {
    fn new(output_tokens_per_entity: usize) -> Self {
        Self {
            current: Vec::new(),
            input_sum: 0,
            batches: Vec::new(),
            next_index: 0,
            input_closures: 0,
            output_closures: 0,
            hard_cap_closures: 0,
            output_tokens_per_entity,
        }
    }

    fn close(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let entities = std::mem::take(&mut self.current);
        let reserved_output_tokens = entities.len() * self.output_tokens_per_entity;
        self.batches.push(Batch {
            estimated_input_tokens: self.input_sum,
            reserved_output_tokens,
            index: self.next_index,
            entities,
        });
        self.next_index += 1;
        self.input_sum = 0;
    }
}

/// Packs `entities` into batches under `budget` and `hard_cap`, preserving
/// input order (§4.4 "Greedy sequential order-preserving packing").
/// `output_tokens_per_entity` is `PipelineConfig::output_tokens_per_entity`,
/// the same constant `budget.max_entities_per_batch_by_output` was derived
/// from.
pub fn pack(
    entities: &[Entity],
    budget: &TokenBudget,
    hard_cap: usize,
    output_tokens_per_entity: usize,
) -> (Vec<Batch>, BatchStats) {
    let mut state = PackState::new(output_tokens_per_entity);
    let mut oversized_entities = Vec::new();

    for entity in entities {
        let cost = estimate_entity_input_tokens(entity);

        if cost > budget.max_input {
            // Step 1: flush whatever is open, then emit this entity alone,
            // flagged oversized (§4.4 step 1, §8 "entity exceeding max_input
            // appears in oversized_entities + own batch").
            state.close();
            tracing::warn!(
                entity_id = %entity.id,
                estimated_tokens = cost,
                max_input = budget.max_input,
                "entity exceeds max_input alone; batching it by itself"
            );
            oversized_entities.push(entity.id);
            state.current.push(entity.clone());
            state.input_sum = cost;
            state.close();
            continue;
        }

        let would_exceed_input = state.input_sum + cost > budget.max_input;
        let would_exceed_output_cap =
            state.current.len() + 1 > budget.max_entities_per_batch_by_output;
        let would_exceed_hard_cap = state.current.len() + 1 > hard_cap;

        if !state.current.is_empty()
            && (would_exceed_input || would_exceed_output_cap || would_exceed_hard_cap)
        {
            if would_exceed_input {
                state.input_closures += 1;
            } else if would_exceed_output_cap {
                state.output_closures += 1;
            } else {
                state.hard_cap_closures += 1;
            }
            state.close();
        }

        state.current.push(entity.clone());
        state.input_sum += cost;
    }

    state.close();

    let total_batches = state.batches.len();
    let average_batch_size = if total_batches == 0 {
        0.0
    } else {
        entities.len() as f64 / total_batches as f64
    };

    let input_utilization_pct = if total_batches == 0 || budget.max_input == 0 {
        0.0
    } else {
        let avg_input: f64 = state
            .batches
            .iter()
            .map(|b| b.estimated_input_tokens as f64)
            .sum::<f64>()
            / total_batches as f64;
        (avg_input / budget.max_input as f64) * 100.0
    };

    let output_utilization_pct = if total_batches == 0 || budget.reserved_output == 0 {
        0.0
    } else {
        let avg_output: f64 = state
            .batches
            .iter()
            .map(|b| b.reserved_output_tokens as f64)
            .sum::<f64>()
            / total_batches as f64;
        (avg_output / budget.reserved_output as f64) * 100.0
    };

    let dominant_limiter = [
        (LimitingConstraint::Input, state.input_closures),
        (LimitingConstraint::Output, state.output_closures),
        (LimitingConstraint::HardCap, state.hard_cap_closures),
    ]
    .into_iter()
    .max_by_key(|(_, count)| *count)
    .filter(|(_, count)| *count > 0)
    .map(|(constraint, _)| constraint)
    .unwrap_or(LimitingConstraint::None);

    (
        state.batches,
        BatchStats {
            total_batches,
            average_batch_size,
            input_utilization_pct,
            output_utilization_pct,
            dominant_limiter,
            oversized_entities,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_ai::ModelDescriptor;
    use codegraph_core::{EntityKind, SourceRange};
    use uuid::Uuid;

    fn small_entity(tokens_target: usize) -> Entity {
        // `estimate_entity_input_tokens` adds a fixed ~25 token structural
        // markup constant; pad the snippet so the total lands near
        // `tokens_target`.
        let padding_chars = tokens_target.saturating_sub(25).saturating_mul(4);
        let snippet = vec!["x".repeat(padding_chars)];
        Entity::new(
            Uuid::new_v4(),
            "f",
            "a.ts",
            EntityKind::Function,
            SourceRange::Span {
                start_line: 1,
                end_line: 1,
            },
        )
        .with_snippet(snippet)
    }

    #[test]
    fn scenario_3_output_limited_batch_of_four() {
        let model = ModelDescriptor {
            id: "test".to_string(),
            context_window: 200_000,
            max_output_tokens: 2048,
            provider: "test".to_string(),
        };
        let budget = TokenBudget::derive(&model, 400, 0.0, 500);
        assert_eq!(budget.max_entities_per_batch_by_output, 4);

        let entities: Vec<Entity> = (0..30).map(|_| small_entity(100)).collect();
        let (batches, stats) = pack(&entities, &budget, 25, 500);

        assert!(batches.len() >= 2);
        assert_eq!(batches[0].entities.len(), 4);
        assert_eq!(stats.dominant_limiter, LimitingConstraint::Output);
        assert!(stats.oversized_entities.is_empty());
    }

    #[test]
    fn packing_is_deterministic() {
        let model = ModelDescriptor::fallback();
        let budget = TokenBudget::derive(&model, 400, 0.1, 50);
        let entities: Vec<Entity> = (0..12).map(|_| small_entity(200)).collect();

        let (batch_a, _) = pack(&entities, &budget, 10, 50);
        let (batch_b, _) = pack(&entities, &budget, 10, 50);

        assert_eq!(batch_a.len(), batch_b.len());
        for (a, b) in batch_a.iter().zip(batch_b.iter()) {
            let ids_a: Vec<_> = a.entities.iter().map(|e| e.id).collect();
            let ids_b: Vec<_> = b.entities.iter().map(|e| e.id).collect();
            assert_eq!(ids_a, ids_b);
        }
    }

    #[test]
    fn oversized_entity_is_batched_alone_and_flagged() {
        let model = ModelDescriptor {
            id: "test".to_string(),
            context_window: 2000,
            max_output_tokens: 500,
            provider: "test".to_string(),
        };
        let budget = TokenBudget::derive(&model, 0, 0.0, 10);

        let huge = small_entity(budget.max_input + 500);
        let normal = small_entity(50);
        let entities = vec![normal.clone(), huge.clone(), normal.clone()];

        let (batches, stats) = pack(&entities, &budget, 25, 10);

        assert!(stats.oversized_entities.contains(&huge.id));
        let huge_batch = batches
            .iter()
            .find(|b| b.entities.iter().any(|e| e.id == huge.id))
            .unwrap();
        assert_eq!(huge_batch.entities.len(), 1);
    }

    #[test]
    fn hard_cap_closes_batch_even_under_token_budget() {
        let model = ModelDescriptor {
            id: "test".to_string(),
            context_window: 1_000_000,
            max_output_tokens: 1_000_000,
            provider: "test".to_string(),
        };
        let budget = TokenBudget::derive(&model, 0, 0.0, 1);
        let entities: Vec<Entity> = (0..10).map(|_| small_entity(10)).collect();

        let (batches, stats) = pack(&entities, &budget, 3, 1);
        assert!(batches.iter().all(|b| b.entities.len() <= 3));
        assert_eq!(stats.dominant_limiter, LimitingConstraint::HardCap);
    }

    #[test]
    fn empty_input_produces_no_batches() {
        let model = ModelDescriptor::fallback();
        let budget = TokenBudget::derive(&model, 400, 0.8, 500);
        let (batches, stats) = pack(&[], &budget, 25, 500);
        assert!(batches.is_empty());
        assert_eq!(stats.total_batches, 0);
    }
}
