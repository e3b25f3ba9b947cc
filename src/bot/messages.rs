//! User-facing texts

pub const PLEASE_START: &str = "Please type /start to begin.";

pub const FOLLOW_PROCESS: &str = "Please follow the process using /start.";

pub const INVALID_EMAIL: &str =
    "❌ That doesn’t look like a valid email address. Please enter a valid email (e.g. user@example.com).";

pub const REQUEST_FILE: &str = "Please upload your file 📄(.csv, .xls, .xlsx only).";

pub const INVALID_FILE_TYPE: &str =
    "❌ Invalid file type. Only 📄 .csv, .xls, or .xlsx are allowed.";

pub const UNSUPPORTED_ATTACHMENT: &str =
    "❌ Unsupported type. Please send your file as a document (.csv, .xls or .xlsx).";

pub const PLEASE_WAIT: &str = "please wait...";

pub const RELAY_SUCCESS: &str = "✅ Your information and file have been sent via email!";

pub const RELAY_FAILED: &str = "⚠️ Error downloading the file.";

pub const PROCEED: &str = "✅ You can now proceed. Type /start again.";

pub fn greeting(display_name: &str) -> String {
    format!(
        "Hello 🤚, {}! \n\nPlease enter your email address ✉️...",
        display_name
    )
}

pub fn cooldown(seconds: u64) -> String {
    format!("⏳ Please wait {}s before trying again.", seconds)
}

pub fn mail_body(email: &str) -> String {
    format!("Email: {}", email)
}
