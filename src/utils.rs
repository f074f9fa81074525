/// Shorten a token for display, keeping only its first and last characters
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let len = chars.len();
    if len <= 15 {
        // Too short to safely show, just show dots
        return "●".repeat(len);
    }

    let first: String = chars[..7].iter().collect();
    let last: String = chars[len - 6..].iter().collect();
    format!("{}...{}", first, last)
}
