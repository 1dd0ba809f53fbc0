// Level-up announcement templates.
//
// Admins configure two templates per guild. Supported placeholders:
// {mention}, {username}, {level}, {oldrole}, {newrole}.

use super::leveling_models::{GuildConfig, LevelUpEvent, NO_TIER_LABEL};

/// Values substituted into a template.
#[derive(Debug, Clone)]
pub struct TemplateVars<'a> {
    pub mention: &'a str,
    pub username: &'a str,
    pub level: u32,
    pub old_role: &'a str,
    pub new_role: &'a str,
}

impl<'a> TemplateVars<'a> {
    pub fn for_event(event: &'a LevelUpEvent, mention: &'a str) -> Self {
        Self {
            mention,
            username: &event.username,
            level: event.new_level,
            old_role: event.old_role.as_deref().unwrap_or(NO_TIER_LABEL),
            new_role: event.new_role.as_deref().unwrap_or(NO_TIER_LABEL),
        }
    }
}

/// Substitute every known placeholder in one pass over the template, so
/// substituted values are never scanned again. Unknown `{...}` sequences are
/// left as typed so a typo shows up in the announcement instead of vanishing.
pub fn render_template(template: &str, vars: &TemplateVars<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            rest = tail;
            break;
        };

        let placeholder = &tail[1..end];
        match placeholder {
            "mention" => out.push_str(vars.mention),
            "username" => out.push_str(vars.username),
            "level" => out.push_str(&vars.level.to_string()),
            "oldrole" => out.push_str(vars.old_role),
            "newrole" => out.push_str(vars.new_role),
            _ => {
                // Not ours; keep the brace and look for a placeholder after it
                out.push('{');
                rest = &tail[1..];
                continue;
            }
        }
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Build the announcement for a level-up, or `None` when nothing should be
/// posted (announcements off, or both templates render empty).
pub fn level_up_announcement(config: &GuildConfig, vars: &TemplateVars<'_>) -> Option<String> {
    if !config.make_announcements {
        return None;
    }

    let mut text = render_template(&config.level_up_message, vars);
    if vars.old_role != vars.new_role {
        text.push_str(&render_template(&config.role_change_message, vars));
    }

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
