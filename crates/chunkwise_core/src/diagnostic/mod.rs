//! User facing errors, optionally linked to a location in a source or config file
mod code_frame;
mod code_highlight;
mod diagnostic;

pub use self::code_frame::*;
pub use self::code_highlight::*;
pub use self::diagnostic::*;

/// Creates a [`DiagnosticError`] from a format string or a [`DiagnosticBuilder`], recording the
/// module it was raised from as the origin.
#[macro_export]
macro_rules! diagnostic_error {
  ($fmt:literal $(, $arg:expr)* $(,)?) => {
    $crate::types::DiagnosticError::new(
      $crate::types::DiagnosticBuilder::default()
        .message(format!($fmt $(, $arg)*))
        .origin(String::from(module_path!()))
        .build(),
    )
  };
  ($builder:expr) => {
    $crate::types::DiagnosticError::new(
      $builder.origin(String::from(module_path!())).build(),
    )
  };
}
