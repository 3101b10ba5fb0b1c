use crate::driver::Column;
use crate::error::CompileError;

/// What the compiler knows of a variable while building one SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VarDesc {
    /// Binding slot of the variable.
    pub slot: usize,
    /// The value comes from the incoming bindings instead of the statement.
    pub is_argument: bool,
    /// The alias and column the variable is read from or compared to.
    column: Option<(usize, Column)>,
}

impl VarDesc {
    pub fn new(slot: usize, is_argument: bool) -> Self {
        Self {
            slot,
            is_argument,
            column: None,
        }
    }

    #[inline]
    pub fn column(&self) -> Option<(usize, Column)> {
        self.column
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.column.is_some()
    }

    /// Binds the variable to a column. A variable is bound at most once.
    pub fn bind(&mut self, alias: usize, column: Column) -> Result<(), CompileError> {
        if self.is_bound() {
            return Err(CompileError::VariableBoundTwice { slot: self.slot });
        }
        self.column = Some((alias, column));
        Ok(())
    }
}
