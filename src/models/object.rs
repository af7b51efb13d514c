//! Identity of a stored object and its backend key.

/// Prefix shared by every object key; the numeric catalog id follows it.
pub const OBJECT_KEY_PREFIX: &str = "urn:oid:";

/// Mimetype the catalog uses for folder entries. Folders have no backing
/// object and are never migrated.
pub const DIRECTORY_MIMETYPE: &str = "httpd/unix-directory";

/// Numeric catalog id of a stored object, stable for the object's lifetime.
pub type ObjectId = i64;

/// Derive the backend key for a catalog object id.
///
/// The key is the same in every bucket, so a copied object keeps its key.
pub fn object_key(id: ObjectId) -> String {
    format!("{}{}", OBJECT_KEY_PREFIX, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_urn_of_object_id() {
        assert_eq!(object_key(42), "urn:oid:42");
        assert_eq!(object_key(0), "urn:oid:0");
    }
}
