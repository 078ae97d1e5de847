//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! Errors raised by the `set_budget` trigger

use pgrx::datum::TryFromDatumError;
use pgrx::trigger_support::PgTriggerError;
use pgrx::{ereport, PgSqlErrorCode};

use crate::event::FiringContext;
use crate::row::IntegerWidth;

/// Every variant aborts the triggering statement.
#[derive(thiserror::Error, Debug)]
pub enum BudgetTriggerError {
    #[error("set_budget: invalid trigger context: {0}")]
    InvalidContext(#[from] PgTriggerError),
    #[error("set_budget: unsupported trigger event")]
    UnsupportedEvent(FiringContext),
    #[error("set_budget: trigger data carries no {0} row")]
    MissingRow(&'static str),
    #[error("set_budget: invalid trigger arguments")]
    InvalidArguments(String),
    #[error("set_budget: column \"{column}\" does not exist in relation \"{relation}\"")]
    MissingColumn { column: String, relation: String },
    #[error("set_budget: column \"{column}\" has unsupported type {type_name}")]
    UnsupportedColumnType { column: String, type_name: String },
    #[error("set_budget: value {value} is out of range for column \"{column}\" of type {width}")]
    ValueOutOfRange { column: String, value: i64, width: IntegerWidth },
    #[error("set_budget: {0}")]
    Datum(#[from] TryFromDatumError),
}

impl BudgetTriggerError {
    pub fn sql_error_code(&self) -> PgSqlErrorCode {
        use BudgetTriggerError::*;
        match self {
            InvalidContext(_) | UnsupportedEvent(_) | MissingRow(_) => {
                PgSqlErrorCode::ERRCODE_E_R_I_E_TRIGGER_PROTOCOL_VIOLATED
            }
            InvalidArguments(_) => PgSqlErrorCode::ERRCODE_INVALID_PARAMETER_VALUE,
            MissingColumn { .. } => PgSqlErrorCode::ERRCODE_UNDEFINED_COLUMN,
            UnsupportedColumnType { .. } | Datum(_) => PgSqlErrorCode::ERRCODE_DATATYPE_MISMATCH,
            ValueOutOfRange { .. } => PgSqlErrorCode::ERRCODE_NUMERIC_VALUE_OUT_OF_RANGE,
        }
    }

    /// Text for the `DETAIL` field of the report, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            BudgetTriggerError::UnsupportedEvent(context) => Some(format!(
                "fired {context}, but set_budget only supports BEFORE INSERT OR UPDATE FOR EACH ROW"
            )),
            BudgetTriggerError::InvalidArguments(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Raise this error as a Postgres `ERROR`, aborting the current statement.
    pub fn report(self) -> ! {
        let code = self.sql_error_code();
        let message = self.to_string();
        match self.detail() {
            Some(detail) => {
                ereport!(ERROR, code, message, detail);
            }
            None => {
                ereport!(ERROR, code, message);
            }
        }
    }
}
