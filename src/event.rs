//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
/*! Decoding of the trigger firing context

Postgres packs the timing, level and operation of a trigger invocation into a
single `tg_event` bitmask. [`FiringContext`] unpacks it once, at entry, and
[`FiringContext::row_event`] is the only place deciding whether `set_budget`
may run for it.

```sql
-- accepted
CREATE TRIGGER pin_budget BEFORE INSERT OR UPDATE ON txn
    FOR EACH ROW EXECUTE FUNCTION set_budget();

-- rejected at the first row (or statement) it fires for
CREATE TRIGGER pin_budget AFTER DELETE ON txn
    FOR EACH ROW EXECUTE FUNCTION set_budget();
```
*/
use std::fmt;

use pgrx::trigger_support::{
    PgTrigger, PgTriggerError, PgTriggerLevel, PgTriggerOperation, PgTriggerWhen,
};

use crate::error::BudgetTriggerError;

/// When the trigger fired, relative to the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Before,
    After,
    InsteadOf,
}

impl From<PgTriggerWhen> for Timing {
    fn from(when: PgTriggerWhen) -> Self {
        match when {
            PgTriggerWhen::Before => Timing::Before,
            PgTriggerWhen::After => Timing::After,
            PgTriggerWhen::InsteadOf => Timing::InsteadOf,
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Timing::Before => "BEFORE",
            Timing::After => "AFTER",
            Timing::InsteadOf => "INSTEAD OF",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Row,
    Statement,
}

impl From<PgTriggerLevel> for Granularity {
    fn from(level: PgTriggerLevel) -> Self {
        match level {
            PgTriggerLevel::Row => Granularity::Row,
            PgTriggerLevel::Statement => Granularity::Statement,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Row => "ROW",
            Granularity::Statement => "STATEMENT",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl From<PgTriggerOperation> for Operation {
    fn from(op: PgTriggerOperation) -> Self {
        match op {
            PgTriggerOperation::Insert => Operation::Insert,
            PgTriggerOperation::Update => Operation::Update,
            PgTriggerOperation::Delete => Operation::Delete,
            PgTriggerOperation::Truncate => Operation::Truncate,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Truncate => "TRUNCATE",
        })
    }
}

/// The `{timing × granularity × operation}` a trigger was fired for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiringContext {
    pub timing: Timing,
    pub granularity: Granularity,
    pub operation: Operation,
}

/// The only events `set_budget` rewrites rows for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEvent {
    Insert,
    Update,
}

impl FiringContext {
    pub fn new(timing: Timing, granularity: Granularity, operation: Operation) -> Self {
        Self { timing, granularity, operation }
    }

    pub fn from_trigger(trigger: &PgTrigger<'_>) -> Result<Self, PgTriggerError> {
        Ok(Self::new(trigger.when()?.into(), trigger.level().into(), trigger.op()?.into()))
    }

    /// Accept `BEFORE INSERT|UPDATE FOR EACH ROW`, reject everything else.
    ///
    /// A mismatch means the trigger was registered on the wrong event, so it is an error
    /// rather than a no-op.
    pub fn row_event(self) -> Result<RowEvent, BudgetTriggerError> {
        match self {
            FiringContext {
                timing: Timing::Before,
                granularity: Granularity::Row,
                operation: Operation::Insert,
            } => Ok(RowEvent::Insert),
            FiringContext {
                timing: Timing::Before,
                granularity: Granularity::Row,
                operation: Operation::Update,
            } => Ok(RowEvent::Update),
            other => Err(BudgetTriggerError::UnsupportedEvent(other)),
        }
    }
}

impl fmt::Display for FiringContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} FOR EACH {}", self.timing, self.operation, self.granularity)
    }
}

impl fmt::Display for RowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RowEvent::Insert => "INSERT",
            RowEvent::Update => "UPDATE",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMINGS: [Timing; 3] = [Timing::Before, Timing::After, Timing::InsteadOf];
    const GRANULARITIES: [Granularity; 2] = [Granularity::Row, Granularity::Statement];
    const OPERATIONS: [Operation; 4] =
        [Operation::Insert, Operation::Update, Operation::Delete, Operation::Truncate];

    #[test]
    fn before_row_insert_and_update_are_accepted() {
        let insert = FiringContext::new(Timing::Before, Granularity::Row, Operation::Insert);
        let update = FiringContext::new(Timing::Before, Granularity::Row, Operation::Update);

        assert_eq!(insert.row_event().unwrap(), RowEvent::Insert);
        assert_eq!(update.row_event().unwrap(), RowEvent::Update);
    }

    #[test]
    fn every_other_shape_is_rejected() {
        let mut rejected = 0;
        for timing in TIMINGS {
            for granularity in GRANULARITIES {
                for operation in OPERATIONS {
                    let context = FiringContext::new(timing, granularity, operation);
                    let supported = timing == Timing::Before
                        && granularity == Granularity::Row
                        && matches!(operation, Operation::Insert | Operation::Update);
                    if supported {
                        continue;
                    }

                    match context.row_event() {
                        Err(BudgetTriggerError::UnsupportedEvent(reported)) => {
                            assert_eq!(reported, context)
                        }
                        other => panic!("{context} was not rejected: {other:?}"),
                    }
                    rejected += 1;
                }
            }
        }
        assert_eq!(rejected, 22);
    }

    #[test]
    fn renders_like_create_trigger() {
        let context = FiringContext::new(Timing::InsteadOf, Granularity::Statement, Operation::Delete);
        assert_eq!(context.to_string(), "INSTEAD OF DELETE FOR EACH STATEMENT");

        let context = FiringContext::new(Timing::After, Granularity::Row, Operation::Truncate);
        assert_eq!(context.to_string(), "AFTER TRUNCATE FOR EACH ROW");
    }
}
