use crate::Recipe;

/// Render a recipe as plain text for the terminal
pub fn render_text(recipe: &Recipe) -> String {
    let mut out = vec![recipe.title.clone()];
    if let Some(description) = recipe.description.as_deref().filter(|d| !d.trim().is_empty()) {
        out.push(String::new());
        out.push(description.to_string());
    }

    out.push(String::new());
    out.push("Ingredients:".to_string());
    out.extend(recipe.ingredients.iter().map(|i| format!("  - {i}")));

    out.push(String::new());
    out.push("Steps:".to_string());
    out.extend(recipe.steps.iter().enumerate().map(|(n, s)| format!("  {}. {s}", n + 1)));

    if !recipe.tips.is_empty() {
        out.push(String::new());
        out.push("Tips:".to_string());
        out.extend(recipe.tips.iter().map(|t| format!("  * {t}")));
    }

    if !recipe.video_id.is_empty() {
        out.push(String::new());
        out.push(crate::watch_url(&recipe.video_id));
    }
    out.join("\n")
}

pub fn render_json(recipe: &Recipe) -> String {
    serde_json::to_string_pretty(recipe).unwrap_or_default()
}
