//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! Which column `set_budget` overwrites, and with what.
//!
//! Both come from the `CREATE TRIGGER` arguments, falling back to the
//! `budget_trigger.default_column` and `budget_trigger.default_value` settings:
//!
//! ```sql
//! EXECUTE FUNCTION set_budget()                       -- defaults
//! EXECUTE FUNCTION set_budget('team_budget')          -- default value
//! EXECUTE FUNCTION set_budget('team_budget', '17')
//! ```
use crate::error::BudgetTriggerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePolicy {
    pub column: String,
    pub value: i64,
}

impl OverridePolicy {
    pub fn from_args(
        args: &[String],
        default_column: Option<&str>,
        default_value: i64,
    ) -> Result<Self, BudgetTriggerError> {
        let (column, value) = match args {
            [] => (default_column, None),
            [column] => (Some(column.as_str()), None),
            [column, value] => (Some(column.as_str()), Some(value.as_str())),
            _ => {
                return Err(BudgetTriggerError::InvalidArguments(format!(
                    "expected at most 2 arguments (column, value), got {}",
                    args.len()
                )))
            }
        };

        let column = match column {
            Some(column) if !column.is_empty() => column.to_string(),
            _ => {
                return Err(BudgetTriggerError::InvalidArguments(
                    "the target column name is empty".to_string(),
                ))
            }
        };

        let value = match value {
            None => default_value,
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                BudgetTriggerError::InvalidArguments(format!(
                    "replacement value \"{raw}\" is not an integer"
                ))
            })?,
        };

        Ok(OverridePolicy { column, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn no_arguments_uses_defaults() {
        let policy = OverridePolicy::from_args(&[], Some("budget_id"), 0).unwrap();
        assert_eq!(policy, OverridePolicy { column: "budget_id".into(), value: 0 });
    }

    #[test]
    fn column_argument_keeps_default_value() {
        let policy = OverridePolicy::from_args(&args(&["team_budget"]), Some("budget_id"), 3)
            .unwrap();
        assert_eq!(policy, OverridePolicy { column: "team_budget".into(), value: 3 });
    }

    #[test]
    fn both_arguments() {
        let policy =
            OverridePolicy::from_args(&args(&["team_budget", " -17 "]), None, 0).unwrap();
        assert_eq!(policy, OverridePolicy { column: "team_budget".into(), value: -17 });
    }

    #[test]
    fn rejects_bad_arguments() {
        let bad = [
            OverridePolicy::from_args(&args(&["a", "1", "extra"]), Some("budget_id"), 0),
            OverridePolicy::from_args(&args(&["budget_id", "one"]), Some("budget_id"), 0),
            OverridePolicy::from_args(&args(&[""]), Some("budget_id"), 0),
            OverridePolicy::from_args(&[], Some(""), 0),
            OverridePolicy::from_args(&[], None, 0),
        ];
        for result in bad {
            assert!(
                matches!(result, Err(BudgetTriggerError::InvalidArguments(_))),
                "{result:?}"
            );
        }
    }
}
