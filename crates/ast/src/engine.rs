use std::any::Any;
use std::panic::AssertUnwindSafe;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::{Tree, UnitHandle};

/// Failure reported by a [`ParseEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	/// The cancellation token fired before the parse finished.
	#[error("parse cancelled")]
	Cancelled,
	/// The parser gave up on this unit.
	#[error("parse failed: {0}")]
	Failed(String),
}

/// Abstract parser (for test mockability and to keep the grammar external).
///
/// Implementations may take tens to hundreds of milliseconds and should poll
/// `cancel` at convenient points.
pub trait ParseEngine: Send + Sync + 'static {
	type Unit: UnitHandle;
	type Ast: Send + Sync + 'static;

	fn parse(&self, unit: &Self::Unit, cancel: &CancellationToken) -> Result<Self::Ast, ParseError>;
}

/// Tree type handed out by a provider over engine `E`.
pub type TreeOf<E> = Tree<<E as ParseEngine>::Unit, <E as ParseEngine>::Ast>;

/// Runs the engine, turning a panic inside the parser into [`ParseError::Failed`].
pub fn parse_guarded<E: ParseEngine>(engine: &E, unit: &E::Unit, cancel: &CancellationToken) -> Result<E::Ast, ParseError> {
	match std::panic::catch_unwind(AssertUnwindSafe(|| engine.parse(unit, cancel))) {
		Ok(result) => result,
		Err(payload) => Err(ParseError::Failed(format!("parse engine panicked: {}", panic_message(payload.as_ref())))),
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		*msg
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.as_str()
	} else {
		"<non-string payload>"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct PanickingEngine;

	impl ParseEngine for PanickingEngine {
		type Unit = u32;
		type Ast = ();

		fn parse(&self, unit: &u32, _cancel: &CancellationToken) -> Result<(), ParseError> {
			panic!("boom on unit {unit}");
		}
	}

	#[test]
	fn panic_in_engine_becomes_failure() {
		let err = parse_guarded(&PanickingEngine, &7, &CancellationToken::new()).unwrap_err();
		let ParseError::Failed(msg) = &err else {
			panic!("expected Failed, got {err:?}");
		};
		assert!(msg.contains("boom on unit 7"), "unexpected message: {msg}");
	}

	#[test]
	fn static_str_payload_is_extracted() {
		let payload: Box<dyn Any + Send> = Box::new("static boom");
		assert_eq!(panic_message(payload.as_ref()), "static boom");
	}

	#[test]
	fn opaque_payload_has_placeholder() {
		let payload: Box<dyn Any + Send> = Box::new(42_u8);
		assert_eq!(panic_message(payload.as_ref()), "<non-string payload>");
	}
}
