pub const REFINE_SYSTEM: &str = include_str!("../data/prompts/refine_system.txt");
pub const ARCHITECT_SYSTEM: &str = include_str!("../data/prompts/architect_system.txt");
pub const ANALYZE_SYSTEM: &str = include_str!("../data/prompts/analyze_system.txt");
pub const POLISH_SYSTEM: &str = include_str!("../data/prompts/polish_system.txt");
pub const TRANSCRIBE: &str = include_str!("../data/prompts/transcribe.txt");
pub const NARRATE: &str = include_str!("../data/prompts/narrate.txt");
pub const IMAGE: &str = include_str!("../data/prompts/image.txt");
pub const VIDEO: &str = include_str!("../data/prompts/video.txt");

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}
