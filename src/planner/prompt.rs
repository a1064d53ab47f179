//! Planner prompt template.
//!
//! Embeds the Notion UI knowledge base so the model plans with the exact
//! element names the strategy tables know how to find.

/// Build the planning prompt for an instruction.
pub fn step_plan_prompt(app: &str, instruction: &str) -> String {
    format!(
        r#"You are an expert {app} automation planner. You know the exact UI structure of {app}.

NOTION UI KNOWLEDGE:
- To create database: Click "New" button -> Click "Database" option -> Click "New database" -> Fill title field
- Settings/Theme: Click "Settings & members" -> "Settings" -> "Appearance" -> Toggle theme
- New page: Click "New" button -> "Page" option -> Fill title field
- Search: Click "Search" or "Quick Find" field in sidebar

Convert this instruction into precise, executable steps using EXACT {app} UI elements:

App: {app}
Instruction: {instruction}

CRITICAL: Use ONLY these exact {app} UI element names:
- "New" button (for creating anything new)
- "Database" option (in the New menu)
- "Page" option (in the New menu)
- "New database" button (after selecting Database)
- "Untitled" field (for page/database titles)
- "Settings & members" button
- "Settings" option
- "Appearance" option
- "Dark mode" toggle
- "Light mode" toggle
- "Search" or "Quick Find" field

Each step is an object with fields: "action" (click|fill|press|navigate|wait),
"selector_hint", "description", "value" (fill text, key name, or wait seconds;
null otherwise), "url" (navigate target; null otherwise).

Example for creating a database:
[
  {{"action": "click", "selector_hint": "New", "description": "Open new item menu", "value": null, "url": null}},
  {{"action": "click", "selector_hint": "Database", "description": "Select database type", "value": null, "url": null}},
  {{"action": "click", "selector_hint": "New database", "description": "Create new database", "value": null, "url": null}},
  {{"action": "fill", "selector_hint": "Untitled", "description": "Name the database", "value": "My Database", "url": null}}
]

Example for toggling the theme:
[
  {{"action": "click", "selector_hint": "Settings & members", "description": "Open settings menu", "value": null, "url": null}},
  {{"action": "click", "selector_hint": "Settings", "description": "Open settings", "value": null, "url": null}},
  {{"action": "click", "selector_hint": "Appearance", "description": "Open appearance settings", "value": null, "url": null}},
  {{"action": "click", "selector_hint": "Dark mode", "description": "Toggle theme mode", "value": null, "url": null}}
]

Now generate steps for: {instruction}

Output ONLY a valid JSON array with exact {app} UI elements. No markdown.
"#
    )
}
