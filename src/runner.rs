//! Try cheap strategies first, and pay for metadata only when one of them needs it.

/// What a strategy needs before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunCondition {
    NoMetadata,
    /// Shapes and types of the sources and of the result must be known.
    WithMetadata,
}

impl RunCondition {
    pub const ALL: &'static [RunCondition] = &[RunCondition::NoMetadata, RunCondition::WithMetadata];
    pub const METADATA: &'static [RunCondition] = &[RunCondition::WithMetadata];
}

pub trait Strategy {
    fn run_conditions(&self) -> &'static [RunCondition];
}

/// Run `attempt` with each strategy in escalating order of cost.
///
/// `prepare` is called at most once per condition, and only if some strategy runs under it.
/// Its errors propagate. A strategy returning `Err` is skipped. `Ok(None)` means every
/// strategy declined.
pub fn run_escalating<S, I, T, E, F>(
    strategies: &[S],
    mut prepare: impl FnMut(RunCondition) -> Result<I, F>,
    mut attempt: impl FnMut(&S, &I) -> Result<T, E>,
) -> Result<Option<T>, F>
where
    S: std::ops::Deref,
    S::Target: Strategy,
    E: std::fmt::Debug,
{
    for condition in [RunCondition::NoMetadata, RunCondition::WithMetadata] {
        let mut prepared = None;
        for strategy in strategies {
            if !strategy.run_conditions().contains(&condition) {
                continue;
            }
            if prepared.is_none() {
                prepared = Some(prepare(condition)?);
            }
            let Some(input) = &prepared else { continue };
            match attempt(strategy, input) {
                Ok(result) => return Ok(Some(result)),
                Err(e) => {
                    tracing::trace!(?condition, error = ?e, "strategy declined");
                }
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;
    use test_log::test;

    struct Fixed(&'static [RunCondition], Result<u32, ()>);

    impl Strategy for Fixed {
        fn run_conditions(&self) -> &'static [RunCondition] {
            self.0
        }
    }

    #[test]
    fn metadata_is_prepared_lazily() {
        let prepared = Cell::new(0);
        let strategies = vec![
            Box::new(Fixed(RunCondition::METADATA, Ok(2))),
            Box::new(Fixed(RunCondition::ALL, Ok(1))),
        ];
        let result: Result<Option<u32>, ()> = run_escalating(
            &strategies,
            |c| {
                prepared.set(prepared.get() + 1);
                Ok(c)
            },
            |s, _| s.1,
        );
        assert_eq!(result, Ok(Some(1)));
        assert_eq!(prepared.get(), 1);
    }

    #[test]
    fn escalates_past_failures() {
        let strategies = vec![
            Box::new(Fixed(RunCondition::ALL, Err(()))),
            Box::new(Fixed(RunCondition::METADATA, Ok(7))),
        ];
        let mut seen = vec![];
        let result: Result<Option<u32>, ()> = run_escalating(
            &strategies,
            |c| {
                seen.push(c);
                Ok(())
            },
            |s, _| s.1,
        );
        assert_eq!(result, Ok(Some(7)));
        assert_eq!(seen, vec![RunCondition::NoMetadata, RunCondition::WithMetadata]);
    }

    #[test]
    fn all_declined() {
        let strategies = vec![Box::new(Fixed(RunCondition::ALL, Err(())))];
        let result: Result<Option<u32>, ()> = run_escalating(&strategies, |_| Ok(()), |s, _: &()| s.1);
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn prepare_errors_propagate() {
        let strategies = vec![Box::new(Fixed(RunCondition::METADATA, Ok(1)))];
        let result: Result<Option<u32>, &str> =
            run_escalating(&strategies, |_| Err("boom"), |s, _: &()| s.1);
        assert_eq!(result, Err("boom"));
    }
}
