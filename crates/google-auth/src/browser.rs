//! Browser-open capability
//!
//! The credential manager never launches a browser itself; the host passes
//! an opener. Anything `Fn(&str) -> Result<()>` works, which keeps tests
//! free to drive the callback directly.

use crate::error::Result;

/// Opens the authorization URL for the user.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

impl<F> BrowserOpener for F
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    fn open(&self, url: &str) -> Result<()> {
        self(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[test]
    fn closures_are_openers() {
        let seen = Mutex::new(Vec::new());
        let opener = |url: &str| -> Result<()> {
            seen.lock().unwrap().push(url.to_string());
            Ok(())
        };
        opener.open("https://example.test/auth").unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["https://example.test/auth"]);
    }

    #[test]
    fn opener_errors_propagate() {
        let opener = |_: &str| -> Result<()> { Err(Error::Browser("no display".into())) };
        let err = BrowserOpener::open(&opener, "u").unwrap_err();
        assert_eq!(err.to_string(), "failed to open browser: no display");
    }
}
