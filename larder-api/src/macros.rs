//! Utility macros for reducing boilerplate

/// Macro to implement `FromRef<AppState>` for state extractors.
///
/// This macro reduces boilerplate for types that need to be extracted
/// from AppState in Axum handlers.
///
/// # Example
/// ```ignore
/// impl_from_ref!(CredentialGate, credentials);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for CredentialGate {
///     fn from_ref(state: &AppState) -> Self {
///         state.credentials.clone()
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
