//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
/*! A `BEFORE ... FOR EACH ROW` trigger that pins a budget column

Attach `set_budget()` to a table and every inserted or updated row is stored with its
`budget_id` column forced to `0`, whatever the statement supplied:

```sql
CREATE TABLE txn (
    id serial8 NOT NULL PRIMARY KEY,
    description text,
    budget_id integer
);

CREATE TRIGGER pin_budget
    BEFORE INSERT OR UPDATE ON txn
    FOR EACH ROW
    EXECUTE FUNCTION set_budget();

INSERT INTO txn (description, budget_id) VALUES ('groceries', 42);
-- stored with budget_id = 0
```

The column and the value can be chosen per trigger, as `set_budget('column', 'value')`, or
globally through the `budget_trigger.default_column` and `budget_trigger.default_value`
settings. Registering the function for any other event (`AFTER`, `FOR EACH STATEMENT`,
`DELETE`, `TRUNCATE`) makes the triggering statement fail.
*/
use pgrx::prelude::*;
use pgrx::trigger_support::PgTrigger;
use pgrx::AllocatedByRust;

pub mod error;
pub mod event;
pub mod guc;
pub mod policy;
pub mod row;

use error::BudgetTriggerError;
use event::{FiringContext, RowEvent};
use policy::OverridePolicy;

::pgrx::pg_module_magic!();

#[pg_guard]
pub extern "C" fn _PG_init() {
    guc::init();
}

#[pg_trigger]
fn set_budget<'a>(
    trigger: &'a PgTrigger<'a>,
) -> Result<Option<PgHeapTuple<'a, AllocatedByRust>>, BudgetTriggerError> {
    // raised here rather than returned, so the report carries our SQLSTATE and detail
    match pin_budget(trigger) {
        Ok(row) => Ok(row),
        Err(e) => e.report(),
    }
}

fn pin_budget<'a>(
    trigger: &'a PgTrigger<'a>,
) -> Result<Option<PgHeapTuple<'a, AllocatedByRust>>, BudgetTriggerError> {
    let event = FiringContext::from_trigger(trigger)?.row_event()?;
    let policy = OverridePolicy::from_args(
        &trigger.extra_args()?,
        guc::default_column().as_deref(),
        guc::default_value(),
    )?;

    // SAFETY: Postgres keeps the trigger's relation open for the whole call
    let relation = unsafe { trigger.relation()? };

    let Some(target) = row::resolve_column(&relation, &policy.column)? else {
        return match guc::missing_column() {
            guc::MissingColumn::Error => Err(BudgetTriggerError::MissingColumn {
                column: policy.column,
                relation: relation.name().to_string(),
            }),
            guc::MissingColumn::Skip => {
                warning!(
                    "set_budget: column \"{}\" does not exist in relation \"{}\", skipping row",
                    policy.column,
                    relation.name()
                );
                Ok(None)
            }
        };
    };

    let value = target.width.narrow(policy.value).ok_or_else(|| {
        BudgetTriggerError::ValueOutOfRange {
            column: policy.column.clone(),
            value: policy.value,
            width: target.width,
        }
    })?;

    // both INSERT and UPDATE rewrite the row about to be written
    let base = match event {
        RowEvent::Insert | RowEvent::Update => trigger.new(),
    }
    .ok_or(BudgetTriggerError::MissingRow("NEW"))?;

    debug1!(
        "set_budget: {} on \"{}\" via trigger \"{}\", {} := {}",
        event,
        relation.name(),
        trigger.name()?,
        policy.column,
        value
    );

    row::rewrite(base, target, value).map(Some)
}

#[cfg(any(test, feature = "pg_test"))]
#[pg_schema]
mod tests {
    use pgrx::prelude::*;
    use pgrx::spi;

    fn budget_table(name: &str) -> spi::Result<()> {
        Spi::run(&format!(
            "CREATE TABLE tests.{name} (id serial PRIMARY KEY, budget_id integer, a text, b integer)"
        ))
    }

    fn pin_budget_on(table: &str, events: &str) -> spi::Result<()> {
        Spi::run(&format!(
            "CREATE TRIGGER pin_budget {events} ON tests.{table} EXECUTE FUNCTION set_budget()"
        ))
    }

    #[pg_test]
    fn insert_forces_budget_to_zero() -> spi::Result<()> {
        budget_table("insert_forces")?;
        pin_budget_on("insert_forces", "BEFORE INSERT OR UPDATE FOR EACH ROW")?;

        Spi::run("INSERT INTO tests.insert_forces (budget_id, a, b) VALUES (42, 'x', 7)")?;

        let budget = Spi::get_one::<i32>("SELECT budget_id FROM tests.insert_forces")?;
        let a = Spi::get_one::<String>("SELECT a FROM tests.insert_forces")?;
        let b = Spi::get_one::<i32>("SELECT b FROM tests.insert_forces")?;
        assert_eq!(budget, Some(0));
        assert_eq!(a.as_deref(), Some("x"));
        assert_eq!(b, Some(7));
        Ok(())
    }

    #[pg_test]
    fn insert_without_budget_is_pinned() -> spi::Result<()> {
        budget_table("insert_null")?;
        pin_budget_on("insert_null", "BEFORE INSERT FOR EACH ROW")?;

        Spi::run("INSERT INTO tests.insert_null (a) VALUES ('x')")?;

        let budget = Spi::get_one::<i32>("SELECT budget_id FROM tests.insert_null")?;
        assert_eq!(budget, Some(0));
        Ok(())
    }

    #[pg_test]
    fn every_inserted_row_is_pinned() -> spi::Result<()> {
        budget_table("insert_many")?;
        pin_budget_on("insert_many", "BEFORE INSERT FOR EACH ROW")?;

        Spi::run(
            "INSERT INTO tests.insert_many (budget_id, a, b)
                SELECT i, 'row ' || i, i FROM generate_series(1, 100) i",
        )?;

        let pinned =
            Spi::get_one::<i64>("SELECT count(*) FROM tests.insert_many WHERE budget_id = 0")?;
        let untouched = Spi::get_one::<i64>(
            "SELECT count(*) FROM tests.insert_many WHERE a = 'row ' || b AND b BETWEEN 1 AND 100",
        )?;
        assert_eq!(pinned, Some(100));
        assert_eq!(untouched, Some(100));
        Ok(())
    }

    #[pg_test]
    fn update_forces_budget_to_zero() -> spi::Result<()> {
        budget_table("update_forces")?;
        // the row predates the trigger, so it keeps its budget until updated
        Spi::run("INSERT INTO tests.update_forces (budget_id, a, b) VALUES (5, 'x', 3)")?;
        pin_budget_on("update_forces", "BEFORE INSERT OR UPDATE FOR EACH ROW")?;

        Spi::run("UPDATE tests.update_forces SET a = 'y'")?;

        let budget = Spi::get_one::<i32>("SELECT budget_id FROM tests.update_forces")?;
        let a = Spi::get_one::<String>("SELECT a FROM tests.update_forces")?;
        let b = Spi::get_one::<i32>("SELECT b FROM tests.update_forces")?;
        assert_eq!(budget, Some(0));
        assert_eq!(a.as_deref(), Some("y"));
        assert_eq!(b, Some(3));
        Ok(())
    }

    #[pg_test]
    fn update_cannot_set_budget() -> spi::Result<()> {
        budget_table("update_budget")?;
        pin_budget_on("update_budget", "BEFORE INSERT OR UPDATE FOR EACH ROW")?;
        Spi::run("INSERT INTO tests.update_budget (a) VALUES ('x')")?;

        Spi::run("UPDATE tests.update_budget SET budget_id = 9")?;

        let budget = Spi::get_one::<i32>("SELECT budget_id FROM tests.update_budget")?;
        assert_eq!(budget, Some(0));
        Ok(())
    }

    #[pg_test]
    fn smallint_and_bigint_columns() -> spi::Result<()> {
        Spi::run("CREATE TABLE tests.widths (budget_id int2, other int8)")?;
        Spi::run(
            "CREATE TRIGGER pin_small BEFORE INSERT ON tests.widths
                FOR EACH ROW EXECUTE FUNCTION set_budget()",
        )?;
        Spi::run(
            "CREATE TRIGGER pin_big BEFORE INSERT ON tests.widths
                FOR EACH ROW EXECUTE FUNCTION set_budget('other', '5000000000')",
        )?;

        Spi::run("INSERT INTO tests.widths VALUES (12, 34)")?;

        let small = Spi::get_one::<i16>("SELECT budget_id FROM tests.widths")?;
        let big = Spi::get_one::<i64>("SELECT other FROM tests.widths")?;
        assert_eq!(small, Some(0));
        assert_eq!(big, Some(5_000_000_000));
        Ok(())
    }

    #[pg_test]
    fn arguments_choose_column_and_value() -> spi::Result<()> {
        Spi::run("CREATE TABLE tests.team (team_budget integer, budget_id integer)")?;
        Spi::run(
            "CREATE TRIGGER pin_team BEFORE INSERT OR UPDATE ON tests.team
                FOR EACH ROW EXECUTE FUNCTION set_budget('team_budget', '17')",
        )?;

        Spi::run("INSERT INTO tests.team VALUES (1, 2)")?;

        let team = Spi::get_one::<i32>("SELECT team_budget FROM tests.team")?;
        let budget = Spi::get_one::<i32>("SELECT budget_id FROM tests.team")?;
        assert_eq!(team, Some(17));
        assert_eq!(budget, Some(2));
        Ok(())
    }

    #[pg_test]
    fn settings_provide_defaults() -> spi::Result<()> {
        Spi::run("CREATE TABLE tests.defaults (account_budget integer)")?;
        Spi::run(
            "CREATE TRIGGER pin_defaults BEFORE INSERT ON tests.defaults
                FOR EACH ROW EXECUTE FUNCTION set_budget()",
        )?;

        Spi::run("SET LOCAL budget_trigger.default_column = 'account_budget'")?;
        Spi::run("SET LOCAL budget_trigger.default_value = 3")?;
        Spi::run("INSERT INTO tests.defaults VALUES (99)")?;

        let budget = Spi::get_one::<i32>("SELECT account_budget FROM tests.defaults")?;
        assert_eq!(budget, Some(3));
        Ok(())
    }

    #[pg_test]
    fn column_resolved_against_live_definition() -> spi::Result<()> {
        budget_table("redefined")?;
        pin_budget_on("redefined", "BEFORE INSERT FOR EACH ROW")?;
        Spi::run("ALTER TABLE tests.redefined DROP COLUMN budget_id")?;
        Spi::run("ALTER TABLE tests.redefined ADD COLUMN budget_id integer")?;

        Spi::run("INSERT INTO tests.redefined (budget_id, a, b) VALUES (42, 'x', 7)")?;

        let budget = Spi::get_one::<i32>("SELECT budget_id FROM tests.redefined")?;
        let b = Spi::get_one::<i32>("SELECT b FROM tests.redefined")?;
        assert_eq!(budget, Some(0));
        assert_eq!(b, Some(7));
        Ok(())
    }

    #[pg_test(error = "set_budget: unsupported trigger event")]
    fn delete_trigger_is_rejected() -> spi::Result<()> {
        budget_table("on_delete")?;
        Spi::run("INSERT INTO tests.on_delete (budget_id) VALUES (1)")?;
        pin_budget_on("on_delete", "BEFORE DELETE FOR EACH ROW")?;

        Spi::run("DELETE FROM tests.on_delete")
    }

    #[pg_test]
    fn rejected_delete_is_not_applied() -> spi::Result<()> {
        budget_table("delete_kept")?;
        Spi::run("INSERT INTO tests.delete_kept (budget_id) VALUES (1)")?;
        pin_budget_on("delete_kept", "BEFORE DELETE FOR EACH ROW")?;

        Spi::run(
            "DO $$
            BEGIN
                DELETE FROM tests.delete_kept;
                RAISE EXCEPTION 'delete was allowed';
            EXCEPTION WHEN trigger_protocol_violated THEN
                NULL;
            END
            $$",
        )?;

        let remaining = Spi::get_one::<i64>("SELECT count(*) FROM tests.delete_kept")?;
        let budget = Spi::get_one::<i32>("SELECT budget_id FROM tests.delete_kept")?;
        assert_eq!(remaining, Some(1));
        assert_eq!(budget, Some(1));
        Ok(())
    }

    #[pg_test(error = "set_budget: unsupported trigger event")]
    fn after_trigger_is_rejected() -> spi::Result<()> {
        budget_table("after_insert")?;
        pin_budget_on("after_insert", "AFTER INSERT FOR EACH ROW")?;

        Spi::run("INSERT INTO tests.after_insert (budget_id) VALUES (1)")
    }

    #[pg_test(error = "set_budget: unsupported trigger event")]
    fn statement_trigger_is_rejected() -> spi::Result<()> {
        budget_table("per_statement")?;
        pin_budget_on("per_statement", "BEFORE INSERT FOR EACH STATEMENT")?;

        Spi::run("INSERT INTO tests.per_statement (budget_id) VALUES (1)")
    }

    #[pg_test]
    fn rejected_truncate_is_not_applied() -> spi::Result<()> {
        budget_table("truncate_kept")?;
        Spi::run("INSERT INTO tests.truncate_kept (budget_id) VALUES (1)")?;
        pin_budget_on("truncate_kept", "BEFORE TRUNCATE FOR EACH STATEMENT")?;

        Spi::run(
            "DO $$
            BEGIN
                TRUNCATE tests.truncate_kept;
                RAISE EXCEPTION 'truncate was allowed';
            EXCEPTION WHEN trigger_protocol_violated THEN
                NULL;
            END
            $$",
        )?;

        let remaining = Spi::get_one::<i64>("SELECT count(*) FROM tests.truncate_kept")?;
        assert_eq!(remaining, Some(1));
        Ok(())
    }

    #[pg_test]
    fn direct_call_is_rejected() -> spi::Result<()> {
        Spi::run(
            "DO $$
            DECLARE
                rejected boolean := false;
            BEGIN
                BEGIN
                    PERFORM set_budget();
                EXCEPTION WHEN others THEN
                    rejected := true;
                END;
                IF NOT rejected THEN
                    RAISE EXCEPTION 'set_budget() accepted a direct call';
                END IF;
            END
            $$",
        )
    }

    #[pg_test(error = "set_budget: column \"budget_id\" does not exist in relation \"no_budget\"")]
    fn missing_column_is_an_error() -> spi::Result<()> {
        Spi::run("CREATE TABLE tests.no_budget (a text)")?;
        pin_budget_on("no_budget", "BEFORE INSERT FOR EACH ROW")?;

        Spi::run("INSERT INTO tests.no_budget VALUES ('x')")
    }

    #[pg_test]
    fn missing_column_can_skip_the_row() -> spi::Result<()> {
        Spi::run("CREATE TABLE tests.skipped (a text)")?;
        pin_budget_on("skipped", "BEFORE INSERT FOR EACH ROW")?;

        Spi::run("SET LOCAL budget_trigger.missing_column = 'skip'")?;
        Spi::run("INSERT INTO tests.skipped VALUES ('x')")?;

        let count = Spi::get_one::<i64>("SELECT count(*) FROM tests.skipped")?;
        assert_eq!(count, Some(0));
        Ok(())
    }

    #[pg_test(error = "set_budget: column \"budget_id\" has unsupported type text")]
    fn non_integer_column_is_rejected() -> spi::Result<()> {
        Spi::run("CREATE TABLE tests.text_budget (budget_id text)")?;
        pin_budget_on("text_budget", "BEFORE INSERT FOR EACH ROW")?;

        Spi::run("INSERT INTO tests.text_budget VALUES ('x')")
    }

    #[pg_test(
        error = "set_budget: value 70000 is out of range for column \"budget_id\" of type smallint"
    )]
    fn value_must_fit_the_column() -> spi::Result<()> {
        Spi::run("CREATE TABLE tests.small_budget (budget_id int2)")?;
        Spi::run(
            "CREATE TRIGGER pin_budget BEFORE INSERT ON tests.small_budget
                FOR EACH ROW EXECUTE FUNCTION set_budget('budget_id', '70000')",
        )?;

        Spi::run("INSERT INTO tests.small_budget VALUES (1)")
    }

    #[pg_test(error = "set_budget: invalid trigger arguments")]
    fn too_many_arguments() -> spi::Result<()> {
        budget_table("three_args")?;
        Spi::run(
            "CREATE TRIGGER pin_budget BEFORE INSERT ON tests.three_args
                FOR EACH ROW EXECUTE FUNCTION set_budget('budget_id', '0', 'extra')",
        )?;

        Spi::run("INSERT INTO tests.three_args (a) VALUES ('x')")
    }

    #[pg_test]
    fn non_integer_value_argument() -> spi::Result<()> {
        budget_table("bad_value")?;
        Spi::run(
            "CREATE TRIGGER pin_budget BEFORE INSERT ON tests.bad_value
                FOR EACH ROW EXECUTE FUNCTION set_budget('budget_id', 'zero')",
        )?;

        Spi::run(
            "DO $$
            BEGIN
                INSERT INTO tests.bad_value (a) VALUES ('x');
                RAISE EXCEPTION 'insert was allowed';
            EXCEPTION WHEN invalid_parameter_value THEN
                NULL;
            END
            $$",
        )?;

        let count = Spi::get_one::<i64>("SELECT count(*) FROM tests.bad_value")?;
        assert_eq!(count, Some(0));
        Ok(())
    }
}

/// This module is required by `cargo pgrx test` invocations.
/// It must be visible at the root of your extension crate.
#[cfg(test)]
pub mod pg_test {
    pub fn setup(_options: Vec<&str>) {
        // perform one-off initialization when the pg_test framework starts
    }

    pub fn postgresql_conf_options() -> Vec<&'static str> {
        // return any postgresql.conf settings that are required for your tests
        vec![]
    }
}
