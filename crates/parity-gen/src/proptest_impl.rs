//! Proptest strategies for input domains
//!
//! Maps each declared parameter type to a strategy, and drives those
//! strategies from a seeded ChaCha RNG so every sampled case is reproducible.

use crate::domain::{InputDomain, InputVector, ParamType, Value};
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};
use sha2::{Digest, Sha256};

/// Alphabet for generated text
const TEXT_ALPHABET: &[char] = &[
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r',
    's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B', 'C', 'X', 'Y', 'Z', '0', '1', '2', '7',
    '9', ' ', '-', '_', '.',
];

/// Strategy for a single parameter type
pub fn value_strategy(kind: &ParamType) -> BoxedStrategy<Value> {
    match kind.clone() {
        ParamType::Int { min, max } => (min..=max).prop_map(Value::Int).boxed(),
        ParamType::Float { min, max } => float_strategy(min, max).prop_map(Value::Float).boxed(),
        ParamType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ParamType::Text { min_len, max_len } => {
            prop::collection::vec(prop::sample::select(TEXT_ALPHABET), min_len..=max_len)
                .prop_map(|chars| Value::Text(chars.into_iter().collect()))
                .boxed()
        }
        ParamType::Choice { options } => prop::sample::select(options)
            .prop_map(Value::Text)
            .boxed(),
        ParamType::IntList { min, max, max_len } => {
            prop::collection::vec(min..=max, 0..=max_len)
                .prop_map(Value::IntList)
                .boxed()
        }
        ParamType::FloatList { min, max, max_len } => {
            prop::collection::vec(float_strategy(min, max), 0..=max_len)
                .prop_map(Value::FloatList)
                .boxed()
        }
    }
}

fn float_strategy(min: f64, max: f64) -> BoxedStrategy<f64> {
    if min == max {
        Just(min).boxed()
    } else {
        (min..=max).boxed()
    }
}

/// Strategy for a full input vector over `domain`
pub fn input_strategy(domain: &InputDomain) -> BoxedStrategy<InputVector> {
    let names: Vec<String> = domain.parameters.iter().map(|p| p.name.clone()).collect();
    let strategies: Vec<BoxedStrategy<Value>> = domain
        .parameters
        .iter()
        .map(|p| value_strategy(&p.kind))
        .collect();
    strategies
        .prop_map(move |values| {
            let mut input = InputVector::new();
            for (name, value) in names.iter().zip(values) {
                input.push(name.clone(), value);
            }
            input
        })
        .boxed()
}

fn case_digest(seed: u64, index: usize) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.finalize().into()
}

/// Deterministic test runner for case `index` of a run seeded with `seed`
///
/// The RNG seed is `SHA-256(seed || index)`, so each case is independent of
/// every other and can be regenerated on its own.
#[must_use]
pub fn seeded_runner(seed: u64, index: usize) -> TestRunner {
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &case_digest(seed, index));
    TestRunner::new_with_rng(Config::default(), rng)
}

/// Draw one input vector for case `index`
///
/// Falls back to typical values if a strategy rejects the draw.
#[must_use]
pub fn sample_input(domain: &InputDomain, seed: u64, index: usize) -> InputVector {
    let mut runner = seeded_runner(seed, index);
    input_strategy(domain).new_tree(&mut runner).map_or_else(
        |_| {
            let mut input = InputVector::new();
            for param in &domain.parameters {
                input.push(param.name.clone(), param.kind.typical());
            }
            input
        },
        |tree| tree.current(),
    )
}
