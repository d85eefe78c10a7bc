/// Read-only view of the plates permitted entry.
pub trait AuthorizationStore: Send {
    /// Exact-match lookup of a normalized plate string.
    fn is_authorized(&self, plate: &str) -> Result<bool, Box<dyn std::error::Error>>;
}
