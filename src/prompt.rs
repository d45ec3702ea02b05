use std::collections::HashMap;

use crate::context::GenerationContext;
use crate::error::TemplateError;

/// Substitute `{name}` placeholders. `{{` and `}}` produce literal braces.
/// Every placeholder must be present in `vars`.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template.char_indices().peekable();

    while let Some((i, c)) = rest.next() {
        match c {
            '{' if rest.peek().is_some_and(|&(_, n)| n == '{') => {
                rest.next();
                out.push('{');
            }
            '}' if rest.peek().is_some_and(|&(_, n)| n == '}') => {
                rest.next();
                out.push('}');
            }
            '{' => {
                let close = template[i + 1..]
                    .find('}')
                    .ok_or(TemplateError::UnclosedBrace(i))?;
                let name = &template[i + 1..i + 1 + close];
                if name.contains('{') {
                    return Err(TemplateError::UnclosedBrace(i));
                }
                let value = vars
                    .get(name.trim())
                    .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
                out.push_str(value);
                while rest.next_if(|&(j, _)| j <= i + 1 + close).is_some() {}
            }
            '}' => return Err(TemplateError::StrayBrace(i)),
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Render `template` with every field of `ctx` available as a placeholder.
pub fn build_prompt(template: &str, ctx: &GenerationContext) -> Result<String, TemplateError> {
    let vars: HashMap<&str, String> = HashMap::from([
        ("date_str", ctx.date_str.clone()),
        ("weekday", ctx.weekday.clone()),
        ("holiday", ctx.holiday.clone()),
        ("persona_desc", ctx.persona_desc.clone()),
        ("history_schedules", ctx.history_schedules.clone()),
        ("recent_chats", ctx.recent_chats.clone()),
        ("outfit_desc", ctx.outfit_desc.clone()),
        ("daily_theme", ctx.variety.daily_theme.to_string()),
        ("mood_color", ctx.variety.mood_color.to_string()),
        ("outfit_style", ctx.variety.outfit_style.to_string()),
        ("schedule_type", ctx.variety.schedule_type.to_string()),
    ]);
    render(template, &vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DEFAULT_PROMPT_TEMPLATE;
    use crate::variety::Variety;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_render_substitutes_and_escapes() {
        let out = render("Hi {name}, {{literal}} {name}!", &vars(&[("name", "Ann")])).unwrap();
        assert_eq!(out, "Hi Ann, {literal} Ann!");
    }

    #[test]
    fn test_render_errors() {
        let v = vars(&[("a", "1")]);
        assert_eq!(
            render("x {missing} y", &v),
            Err(TemplateError::UnknownPlaceholder("missing".into()))
        );
        assert_eq!(render("x {a", &v), Err(TemplateError::UnclosedBrace(2)));
        assert_eq!(render("x {a {a}", &v), Err(TemplateError::UnclosedBrace(2)));
        assert_eq!(render("x } y", &v), Err(TemplateError::StrayBrace(2)));
    }

    #[test]
    fn test_render_multibyte_text() {
        let out = render("日期：{a}。{{ok}}", &vars(&[("a", "十月")])).unwrap();
        assert_eq!(out, "日期：十月。{ok}");
    }

    #[test]
    fn test_default_template_renders_fully() {
        let ctx = GenerationContext {
            date_str: "October 17, 2026".into(),
            weekday: "Saturday".into(),
            holiday: String::new(),
            persona_desc: "persona".into(),
            history_schedules: "[2026-10-16]: rainy walk...".into(),
            recent_chats: "no recent conversation".into(),
            outfit_desc: "desc".into(),
            variety: Variety {
                daily_theme: "slow morning",
                mood_color: "soft blue",
                outfit_style: "minimalist",
                schedule_type: "homebody day",
            },
        };
        let prompt = build_prompt(DEFAULT_PROMPT_TEMPLATE, &ctx).unwrap();
        assert!(prompt.contains("Date: October 17, 2026 Saturday"));
        assert!(prompt.contains("[2026-10-16]: rainy walk..."));
        assert!(prompt.contains("Theme: [slow morning]"));
        assert!(prompt.contains("\"outfit\": \"today's outfit"));
        assert!(!prompt.contains("{{"));
    }
}
