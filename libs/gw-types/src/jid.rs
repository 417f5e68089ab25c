//! Helpers for the WhatsApp JID (`<digits-or-id>@<server>`) address format.

const GROUP_SUFFIX: &str = "@g.us";
const INDIVIDUAL_SUFFIX: &str = "@s.whatsapp.net";

/// True when `jid` addresses a group chat rather than an individual.
pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with(GROUP_SUFFIX)
}

/// Normalizes a phone number or bare JID into a full individual JID.
///
/// If `to` already contains an `@`, it is assumed to be a complete JID and
/// returned unchanged. Otherwise non-digit characters are stripped and the
/// individual-chat suffix is appended.
pub fn normalize_to_jid(to: &str) -> String {
    if to.contains('@') {
        return to.to_string();
    }
    let digits: String = to.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}{INDIVIDUAL_SUFFIX}")
}

/// Derives an E.164 phone number (`+<digits>`) from the user part of a JID.
///
/// The digit string is used verbatim, without truncation: the source
/// material this was distilled from truncated long JIDs to 12 digits in one
/// code path but not another, which reads as an inconsistency rather than a
/// deliberate rule, so we preserve every digit instead of picking a side.
pub fn derive_e164(jid: &str) -> String {
    let user = jid.split('@').next().unwrap_or(jid);
    let digits: String = user.chars().filter(char::is_ascii_digit).collect();
    format!("+{digits}")
}
