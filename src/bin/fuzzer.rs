//! Convergence fuzzer (§8): generates a batch of concurrent operations from several
//! simulated authors, replays that same batch in many different arrival orders through
//! `transform_against_operations`, and asserts the resulting text is identical every time.
//! This is the property the whole OT pipeline exists to guarantee; this binary exercises it
//! at a much larger scale than the unit tests in `operation.rs` can afford to.

use collab_core::ids::{DocumentId, UserId};
use collab_core::logging;
use collab_core::operation::{
    apply_in_place, char_len, transform_against_operations, validate_bounds, Operation,
};
use pretty_assertions::assert_eq;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

const SCENARIOS: usize = 200;
const AUTHORS: usize = 4;
const OPS_PER_AUTHOR: usize = 3;
const PERMUTATIONS_PER_SCENARIO: usize = 6;

fn random_base_text(rng: &mut impl Rng) -> String {
    const WORDS: [&str; 8] = [
        "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel",
    ];
    let word_count = rng.gen_range(1..=6);
    (0..word_count)
        .map(|_| *WORDS.choose(rng).expect("WORDS is non-empty"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn random_operation(
    document_id: &DocumentId,
    author_id: &UserId,
    base_len: u64,
    rng: &mut impl Rng,
) -> Operation {
    let want_delete = base_len > 0 && rng.gen_bool(0.5);
    if want_delete {
        let length = rng.gen_range(1..=base_len);
        let position = rng.gen_range(0..=(base_len - length));
        Operation::delete(document_id.clone(), author_id.clone(), position, length, 0)
    } else {
        let position = rng.gen_range(0..=base_len);
        let content_len = rng.gen_range(1..=4);
        let content: String = (0..content_len)
            .map(|_| rng.gen_range(b'a'..=b'z') as char)
            .collect();
        Operation::insert(document_id.clone(), author_id.clone(), position, content, 0)
    }
}

/// Replays `ops` against `base_text` in the given `order`, transforming each operation
/// against every operation already applied in this replay (they are all concurrent: every
/// one carries `base_version = 0`). Returns the resulting text.
fn replay(base_text: &str, ops: &[Operation], order: &[usize]) -> String {
    let mut text = base_text.to_string();
    let mut applied: Vec<Operation> = Vec::with_capacity(ops.len());

    for &index in order {
        let candidate = transform_against_operations(&ops[index], &applied);
        validate_bounds(&candidate, &text)
            .unwrap_or_else(|e| panic!("transformed operation out of bounds: {e}"));
        apply_in_place(&mut text, &candidate);
        applied.push(candidate);
    }

    text
}

fn run_scenario(seed_rng: &mut impl Rng, scenario: usize) {
    let document_id = DocumentId(format!("fuzz-{scenario}"));
    let base_text = random_base_text(seed_rng);
    let base_len = char_len(&base_text);

    let mut ops = Vec::with_capacity(AUTHORS * OPS_PER_AUTHOR);
    for author in 0..AUTHORS {
        let author_id = UserId(format!("author-{author}"));
        for _ in 0..OPS_PER_AUTHOR {
            ops.push(random_operation(&document_id, &author_id, base_len, seed_rng));
        }
    }

    let canonical_order: Vec<usize> = (0..ops.len()).collect();
    let reference = replay(&base_text, &ops, &canonical_order);

    for permutation in 0..PERMUTATIONS_PER_SCENARIO {
        let mut order = canonical_order.clone();
        order.shuffle(seed_rng);
        let result = replay(&base_text, &ops, &order);
        assert_eq!(
            result, reference,
            "scenario {scenario} permutation {permutation} diverged (order {order:?})"
        );
    }
}

fn main() {
    logging::initialize(false);

    let mut rng = rand::thread_rng();
    for scenario in 0..SCENARIOS {
        run_scenario(&mut rng, scenario);
    }

    info!(
        scenarios = SCENARIOS,
        "convergence fuzzer completed with no divergence"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_handful_of_scenarios_converge() {
        let mut rng = rand::thread_rng();
        for scenario in 0..20 {
            run_scenario(&mut rng, scenario);
        }
    }
}
