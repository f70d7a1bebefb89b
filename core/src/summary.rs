use crate::state::FilterState;

/// Short labels for the active-filter chips, in display order.
pub fn active_filter_summaries(state: &FilterState) -> Vec<String> {
    let mut out = Vec::new();
    let term = state.search_term.trim();
    if !term.is_empty() {
        out.push(format!("Busca: \"{term}\""));
    }
    if let Some(status) = &state.status {
        out.push(format!("Status: {status}"));
    }
    if let Some(segment) = &state.segment {
        out.push(format!("Segmento: {segment}"));
    }
    if let Some(window) = state.last_contact {
        out.push(format!("Último contato: {}", window.label()));
    }
    if let Some(min) = state.min_rating {
        out.push(format!("Rating {min}+"));
    }
    if let Some(flag) = state.has_whatsapp {
        out.push(format!("WhatsApp: {}", if flag { "sim" } else { "não" }));
    }
    if !state.tags.is_empty() {
        out.push(format!("Tags: {}", state.tags.join(", ")));
    }
    out.extend(state.custom_fields.values().map(|filter| filter.to_string()));
    match state.advanced.rule_count() {
        0 => {}
        1 => out.push("1 regra avançada".to_string()),
        n => out.push(format!("{n} regras avançadas")),
    }
    out
}
