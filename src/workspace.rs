use crate::error::ConfigError;

/// Split a linear index into `(target, username, password)` positions.
///
/// Passwords vary fastest, then usernames, then targets. Callers must keep
/// `i < targets * users * passwords`; `users` and `passwords` must be non-zero.
pub fn decompose(i: u64, users: u64, passwords: u64) -> (u64, u64, u64) {
    let per_target = users * passwords;
    let rem = i % per_target;
    (i / per_target, rem / passwords, rem % passwords)
}

/// Inverse of [`decompose`].
pub fn compose(target: u64, user: u64, pass: u64, users: u64, passwords: u64) -> u64 {
    target * users * passwords + user * passwords + pass
}

/// One concrete (target, username, password) triple borrowed from a [`WorkSpace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triple<'a> {
    pub target: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

/// The immutable cross product of targets, usernames and passwords.
#[derive(Debug, Clone)]
pub struct WorkSpace {
    targets: Vec<String>,
    usernames: Vec<String>,
    passwords: Vec<String>,
    size: u64,
}

impl WorkSpace {
    pub fn new(
        targets: Vec<String>,
        usernames: Vec<String>,
        passwords: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let size = (targets.len() as u64)
            .checked_mul(usernames.len() as u64)
            .and_then(|n| n.checked_mul(passwords.len() as u64))
            .ok_or(ConfigError::WorkSpaceOverflow)?;
        Ok(Self {
            targets,
            usernames,
            passwords,
            size,
        })
    }

    /// `|targets| * |usernames| * |passwords|`.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn usernames(&self) -> &[String] {
        &self.usernames
    }

    pub fn passwords(&self) -> &[String] {
        &self.passwords
    }

    /// Resolve a linear index, or `None` when it lies outside `[0, size)`.
    pub fn get(&self, i: u64) -> Option<Triple<'_>> {
        if i >= self.size {
            return None;
        }
        let (t, u, p) = decompose(
            i,
            self.usernames.len() as u64,
            self.passwords.len() as u64,
        );
        Some(Triple {
            target: &self.targets[t as usize],
            username: &self.usernames[u as usize],
            password: &self.passwords[p as usize],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn decompose_small_grid() {
        // 2 users x 3 passwords per target
        assert_eq!(decompose(0, 2, 3), (0, 0, 0));
        assert_eq!(decompose(2, 2, 3), (0, 0, 2));
        assert_eq!(decompose(3, 2, 3), (0, 1, 0));
        assert_eq!(decompose(6, 2, 3), (1, 0, 0));
        assert_eq!(decompose(11, 2, 3), (1, 1, 2));
    }

    #[test]
    fn size_is_cross_product() {
        let ws = WorkSpace::new(
            strings(&["10.0.0.1", "10.0.0.2"]),
            strings(&["admin"]),
            strings(&["a", "b", "c"]),
        )
        .unwrap();
        assert_eq!(ws.size(), 6);
        assert!(ws.get(6).is_none());
    }

    #[test]
    fn empty_list_gives_empty_space() {
        let ws = WorkSpace::new(strings(&["10.0.0.1"]), Vec::new(), strings(&["x"])).unwrap();
        assert!(ws.is_empty());
        assert!(ws.get(0).is_none());
    }
}
