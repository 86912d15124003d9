//! Content-addressed identifiers.
//!
//! A [`Work`](dockmaster_db::models::Work) id is derived from
//! `project_root` + `branch_name` via HMAC-SHA256, truncated to a short hex
//! prefix. Deriving the id this way (rather than a random UUID) means the
//! same branch in the same project always maps to the same work id, which
//! is what makes `work create` safe to re-run after a partial failure.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Number of hex characters kept from the HMAC digest.
const SHORT_ID_LEN: usize = 8;

/// Derive a short, stable work id from a project root and branch name.
///
/// Returns `w-<8 hex chars>`.
pub fn work_id(project_root: &str, branch_name: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(project_root.as_bytes()).expect("HMAC accepts any key length");
    mac.update(branch_name.as_bytes());
    let digest = mac.finalize().into_bytes();
    format!("w-{}", &hex::encode(digest)[..SHORT_ID_LEN])
}

/// Build the next task id for a work: `<work_id>.<seq>`.
pub fn task_id(work_id: &str, seq: i64) -> String {
    format!("{work_id}.{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_id() {
        let a = work_id("/srv/proj", "feat/add-logging");
        let b = work_id("/srv/proj", "feat/add-logging");
        assert_eq!(a, b);
    }

    #[test]
    fn different_branches_produce_different_ids() {
        let a = work_id("/srv/proj", "feat/add-logging");
        let b = work_id("/srv/proj", "feat/remove-logging");
        assert_ne!(a, b);
    }

    #[test]
    fn different_projects_produce_different_ids() {
        let a = work_id("/srv/proj-a", "feat/x");
        let b = work_id("/srv/proj-b", "feat/x");
        assert_ne!(a, b);
    }

    #[test]
    fn id_has_expected_shape() {
        let id = work_id("/srv/proj", "feat/x");
        assert!(id.starts_with("w-"));
        assert_eq!(id.len(), 2 + SHORT_ID_LEN);
    }

    #[test]
    fn task_id_formats_as_dotted_sequence() {
        assert_eq!(task_id("w-abcd1234", 3), "w-abcd1234.3");
    }
}
