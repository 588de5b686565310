//! Terminal color selection.

use termcolor::ColorChoice;

/// Resolve `ColorChoice` from the `--color` flag and the environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    color_from_flag(flag)
}

fn color_from_flag(flag: Option<&str>) -> ColorChoice {
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_values() {
        assert_eq!(color_from_flag(Some("always")), ColorChoice::Always);
        assert_eq!(color_from_flag(Some("never")), ColorChoice::Never);
        assert_eq!(color_from_flag(Some("auto")), ColorChoice::Auto);
        assert_eq!(color_from_flag(None), ColorChoice::Auto);
    }
}
