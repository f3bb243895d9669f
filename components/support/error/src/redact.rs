/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Functions to redact strings to remove PII before logging them

/// Redact a URL, replacing all characters other than [`:`, `/`] with `x`
pub fn redact_url(url: &str) -> String {
    url.replace(|ch| ch != ':' && ch != '/', "x")
}

/// Keep the first few characters of a key or token, enough to correlate log lines.
pub fn redact_key(key: &str) -> String {
    let visible: String = key.chars().take(6).collect();
    if visible.len() == key.len() {
        "x".repeat(key.len())
    } else {
        format!("{visible}…")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://fcm.googleapis.com/fcm/send/abc"),
            "xxxxx://xxxxxxxxxxxxxxxxxx/xxx/xxxx/xxx"
        );
    }

    #[test]
    fn test_redact_key() {
        assert_eq!(redact_key("BEl62iUYgUivxIkv69yViEuiBIa"), "BEl62i…");
        assert_eq!(redact_key("abc"), "xxx");
    }
}
