//! Capability checks for book mutations.
//!
//! Authorization compares keys, never usernames. A mutation is allowed only
//! when the caller is the book's local identity *and* owns the target log.

use crate::error::LogbookError;
use crate::identity::{Author, AuthorId};
use crate::oplog::Oplog;

/// Require that `caller` is the identity the book signs as.
///
/// # Errors
/// Returns [`LogbookError::Unauthorized`] if the keys differ.
pub fn require_local(caller: &Author, local: &Author) -> Result<(), LogbookError> {
    if caller.id() == local.id() {
        Ok(())
    } else {
        Err(LogbookError::Unauthorized {
            message: format!(
                "caller {} ({}) is not this book's identity {} ({})",
                caller.username(),
                caller.id().short(),
                local.username(),
                local.id().short(),
            ),
        })
    }
}

/// Require that `caller` owns `log`.
///
/// # Errors
/// Returns [`LogbookError::Unauthorized`] if the log has another owner.
pub fn require_owner(caller: &Author, log: &Oplog) -> Result<(), LogbookError> {
    if &caller.id() == log.owner() {
        Ok(())
    } else {
        Err(LogbookError::Unauthorized {
            message: format!(
                "dataset {} is owned by {} ({}), not {}",
                log.id().short(),
                log.username(),
                log.owner().short(),
                caller.id().short(),
            ),
        })
    }
}

/// Require that a foreign log's owner key is the one registered for its
/// username.
///
/// # Errors
/// Returns [`LogbookError::Unauthorized`] if no key is registered or the
/// keys differ.
pub fn require_registered_owner(
    log: &Oplog,
    registered: Option<AuthorId>,
) -> Result<(), LogbookError> {
    match registered {
        Some(key) if &key == log.owner() => Ok(()),
        Some(key) => Err(LogbookError::Unauthorized {
            message: format!(
                "log for {} is signed by {}, but {} is registered",
                log.username(),
                log.owner().short(),
                key.short(),
            ),
        }),
        None => Err(LogbookError::Unauthorized {
            message: format!("no public key registered for {}", log.username()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{DatasetName, Username};

    fn author(name: &str, seed: u8) -> Author {
        Author::from_bytes(Username::new(name).unwrap(), &[seed; 32])
    }

    #[test]
    fn local_check_uses_keys_not_names() {
        let local = author("b5", 1);
        assert!(require_local(&local, &local).is_ok());
        let impostor = author("b5", 2);
        assert!(matches!(
            require_local(&impostor, &local),
            Err(LogbookError::Unauthorized { .. })
        ));
    }

    #[test]
    fn owner_check() {
        let b5 = author("b5", 1);
        let log = Oplog::init(&b5, DatasetName::new("a").unwrap(), 1).unwrap();
        assert!(require_owner(&b5, &log).is_ok());
        assert!(require_owner(&author("ramfox", 2), &log).is_err());
    }

    #[test]
    fn registered_owner_check() {
        let ramfox = author("ramfox", 2);
        let log = Oplog::init(&ramfox, DatasetName::new("a").unwrap(), 1).unwrap();
        assert!(require_registered_owner(&log, Some(ramfox.id())).is_ok());
        assert!(require_registered_owner(&log, Some(author("ramfox", 3).id())).is_err());
        assert!(require_registered_owner(&log, None).is_err());
    }
}
