/// FFmpeg command assertion utilities
#[allow(dead_code)]
pub fn assert_cmd_contains(cmd: &str, flag: &str) {
    assert!(
        cmd.contains(flag),
        "Expected FFmpeg command to contain '{}' but it didn't.\nCommand: {}",
        flag,
        cmd
    );
}

/// Check if a command string does NOT contain a specific flag
#[allow(dead_code)]
pub fn assert_cmd_not_contains(cmd: &str, flag: &str) {
    assert!(
        !cmd.contains(flag),
        "Expected FFmpeg command to NOT contain '{}' but it did.\nCommand: {}",
        flag,
        cmd
    );
}

/// Check if a command contains a flag with a specific value
#[allow(dead_code)]
pub fn assert_cmd_has_flag_value(cmd: &str, flag: &str, value: &str) {
    assert_eq!(
        get_flag_value(cmd, flag),
        Some(value),
        "Expected '{} {}' in command: {}",
        flag,
        value,
        cmd
    );
}

/// First value following `flag` (e.g. "18" from "-crf 18")
#[allow(dead_code)]
pub fn get_flag_value<'a>(cmd: &'a str, flag: &str) -> Option<&'a str> {
    let mut tokens = cmd.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == flag {
            return tokens.next();
        }
    }
    None
}

/// Every value following `flag`, in order
#[allow(dead_code)]
pub fn get_flag_values<'a>(cmd: &'a str, flag: &str) -> Vec<&'a str> {
    let tokens: Vec<&str> = cmd.split_whitespace().collect();
    tokens
        .windows(2)
        .filter(|pair| pair[0] == flag)
        .map(|pair| pair[1])
        .collect()
}

/// Assert that a numeric flag has a specific value
#[allow(dead_code)]
pub fn assert_numeric_flag(cmd: &str, flag: &str, expected: i64) {
    let Some(value_str) = get_flag_value(cmd, flag) else {
        panic!("Flag '{}' not found in command: {}", flag, cmd);
    };
    let value: i64 = value_str
        .parse()
        .unwrap_or_else(|_| panic!("Could not parse value '{}' for flag '{}'", value_str, flag));
    assert_eq!(
        value, expected,
        "Expected {} to be {} but got {}",
        flag, expected, value
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_flag_value() {
        let cmd = "ffmpeg -i input.mp4 -crf 18 -b:v 8M output.mp4";
        assert_eq!(get_flag_value(cmd, "-crf"), Some("18"));
        assert_eq!(get_flag_value(cmd, "-b:v"), Some("8M"));
        assert_eq!(get_flag_value(cmd, "-nonexistent"), None);
    }

    #[test]
    fn test_get_flag_values() {
        let cmd = "ffmpeg -i a.avs -i b.mkv -map 0:v:0 -map 1:a?";
        assert_eq!(get_flag_values(cmd, "-i"), vec!["a.avs", "b.mkv"]);
        assert_eq!(get_flag_values(cmd, "-map"), vec!["0:v:0", "1:a?"]);
    }

    #[test]
    #[should_panic(expected = "Expected FFmpeg command to contain")]
    fn test_assert_cmd_contains_fails() {
        assert_cmd_contains("ffmpeg -i input.mp4", "-nonexistent");
    }
}
