//! Randomised protocol sequences checked against the provider's invariants.

use std::sync::Arc;

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use super::AstProvider;
use crate::cfg::AstProviderCfg;
use crate::test_support::{MockAst, MockEngine};
use crate::types::{Generation, WaitPolicy};

const UNITS: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone)]
enum Op {
	SetActive(Option<usize>),
	Begin(usize),
	/// Completes with the `n`th most recent generation handed out, if any.
	Reconcile { unit: usize, back: usize, with_tree: bool },
	GetNoWait(usize),
	GetActiveOnly(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
	prop_oneof![
		prop::option::of(0..UNITS.len()).prop_map(Op::SetActive),
		(0..UNITS.len()).prop_map(Op::Begin),
		(0..UNITS.len(), 0usize..3, any::<bool>()).prop_map(|(unit, back, with_tree)| Op::Reconcile { unit, back, with_tree }),
		(0..UNITS.len()).prop_map(Op::GetNoWait),
		(0..UNITS.len()).prop_map(Op::GetActiveOnly),
	]
}

fn provider(engine: &Arc<MockEngine>) -> AstProvider<MockEngine> {
	AstProvider::new(Arc::clone(engine), AstProviderCfg::default())
}

proptest! {
	/// Must keep the cached tree on the active unit and never move the
	/// generation backwards, whatever order notifications arrive in.
	#[test]
	fn protocol_sequences_hold_invariants(ops in prop::collection::vec(arb_op(), 1..60)) {
		let engine = Arc::new(MockEngine::new());
		let provider = provider(&engine);
		let cancel = CancellationToken::new();
		let mut handed_out: Vec<(usize, Generation)> = Vec::new();
		let mut last_generation = provider.generation();

		for op in ops {
			match op {
				Op::SetActive(unit) => provider.set_active_unit(unit.map(|i| UNITS[i])),
				Op::Begin(unit) => {
					if let Some(generation) = provider.about_to_reconcile(&UNITS[unit]) {
						handed_out.push((unit, generation));
					}
				}
				Op::Reconcile { unit, back, with_tree } => {
					let generation = handed_out
						.iter()
						.rev()
						.nth(back)
						.map_or(provider.generation(), |(_, g)| *g);
					let ast = with_tree.then_some(MockAst { unit: UNITS[unit], serial: 0 });
					provider.reconciled(ast, &UNITS[unit], generation);
				}
				Op::GetNoWait(unit) => {
					let tree = provider.get_tree(&UNITS[unit], WaitPolicy::NoWait, &cancel);
					if let Some(tree) = tree {
						prop_assert_eq!(*tree.unit(), UNITS[unit]);
					}
				}
				Op::GetActiveOnly(unit) => {
					let parses = engine.parse_count();
					let tree = provider.get_tree(&UNITS[unit], WaitPolicy::ActiveOnly, &cancel);
					prop_assert_eq!(engine.parse_count(), parses, "ActiveOnly must never parse");
					if tree.is_some() {
						prop_assert_eq!(provider.active_unit(), Some(UNITS[unit]));
					}
				}
			}

			provider.check_invariants();
			let generation = provider.generation();
			prop_assert!(generation >= last_generation);
			last_generation = generation;
			if let Some(cached) = provider.cached_unit() {
				prop_assert_eq!(provider.active_unit(), Some(cached));
				prop_assert!(!provider.is_reconciling(&cached), "a unit being reconciled must not be served from cache");
			}
		}
	}

	/// Must install exactly the tree of the latest cycle when it completes
	/// after every older one.
	#[test]
	fn latest_generation_wins(stale in prop::collection::vec(0usize..UNITS.len(), 0..8)) {
		let engine = Arc::new(MockEngine::new());
		let provider = provider(&engine);
		let cancel = CancellationToken::new();
		provider.set_active_unit(Some("a"));

		let mut older = Vec::new();
		for unit in stale {
			if let Some(generation) = provider.about_to_reconcile(&UNITS[unit]) {
				older.push((unit, generation));
			}
		}
		let latest = provider.about_to_reconcile(&"a").unwrap();
		provider.reconciled(Some(MockAst { unit: "a", serial: 42 }), &"a", latest);
		for (unit, generation) in older {
			provider.reconciled(Some(MockAst { unit: UNITS[unit], serial: 0 }), &UNITS[unit], generation);
		}

		let tree = provider.get_tree(&"a", WaitPolicy::NoWait, &cancel);
		prop_assert_eq!(tree.map(|t| t.ast().serial), Some(42));
		prop_assert_eq!(engine.parse_count(), 0);
	}
}
