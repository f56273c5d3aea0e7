//! Expander trait: the seam between the search policies and the code that
//! turns a state into scored successors.
//!
//! In the server this is the sandboxed script executor; in tests it is
//! usually a closure wrapped in [`FnExpander`].

use serde_json::Value;
use std::convert::Infallible;

/// One candidate child produced by an expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct Successor {
    pub state: Value,
    pub score: f64,
}

impl Successor {
    pub fn new(state: Value, score: f64) -> Self {
        Self { state, score }
    }
}

/// Produces successors for a node.
///
/// `state` is None when expanding the root.
pub trait Expander {
    type Error;

    fn expand(&mut self, action: &str, state: Option<&Value>)
        -> Result<Vec<Successor>, Self::Error>;
}

/// Adapts a closure into an [`Expander`]. The same closure serves every action.
pub struct FnExpander<F>(pub F);

impl<F> Expander for FnExpander<F>
where
    F: FnMut(&str, Option<&Value>) -> Vec<Successor>,
{
    type Error = Infallible;

    fn expand(
        &mut self,
        action: &str,
        state: Option<&Value>,
    ) -> Result<Vec<Successor>, Self::Error> {
        Ok((self.0)(action, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fn_expander_passes_action_and_state() {
        let mut seen = Vec::new();
        let mut expander = FnExpander(|action: &str, state: Option<&Value>| {
            seen.push((action.to_string(), state.cloned()));
            vec![Successor::new(json!(1), 0.5)]
        });

        let out = expander.expand("grow", None).unwrap();
        assert_eq!(out, vec![Successor::new(json!(1), 0.5)]);
        expander.expand("grow", Some(&json!(1))).unwrap();
        drop(expander);

        assert_eq!(
            seen,
            vec![("grow".to_string(), None), ("grow".to_string(), Some(json!(1)))]
        );
    }
}
