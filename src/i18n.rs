/*
Simple i18n helper for the backend.

This module provides:
- A tiny embedded translations store for RU/EN (compile-time embedded JSON).
- A simple `tr` function to lookup translations by key + optional params.
- A `t` convenience wrapper using the default language (DEFAULT_LANG).

Usage:
    use crate::i18n;
    let msg = i18n::t("report.unnamed");
    let msg_with = i18n::tr(None, "messages.reminder", Some(&[("name", "Inventory"), ("time", "01.05.2025 10:00:00"), ("description", "Monthly stocktake")]));

Notes:
- Placeholders in translation strings use single-brace format: `{name}`.
- Default language is `ru` (the messages the legacy studio chats expect).
  If a key is missing for the requested language, the fallback language
  will be used.
*/

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_LANG: &str = "ru";

static TRANSLATIONS: OnceLock<HashMap<String, HashMap<String, String>>> = OnceLock::new();

const RU_JSON: &str = r#"
{
  "messages.new_event": "Новое событие! \n\nНазвание: {name}.\nВремя: {time}\nОписание: {description}",
  "messages.report_suffix": "\n\nДанное событие необходимо закрыть отчетом!!!",
  "messages.reminder": "Напоминание! \n\nНазвание: {name}.\nВремя: {time}\nОписание: {description}",
  "messages.periodic_reminder": "Напоминание! \n\nНазвание: {name}.\nОписание: {description}\n\nЭто периодическое событие!",
  "report.saved": "Отчет по событию: \"{name}\" успешно сохранен!",
  "report.not_saved": "Отчет по событию: \"{name}\" не может быть сохранен. Пожалуйста обратитесь к администратору для сохранения отчета!",
  "report.unnamed": "Похоже это безимянное событие. Пожалуйста обратитесь к администратору для сохранения отчета!",
  "report.error": "Ошибка при сохранении отчета!",
  "event.created": "Событие создано успешно!",
  "event.deleted": "Событие удалено!",
  "not_found.event": "Событие не найдено",
  "not_found.studio": "Студия не найдена"
}
"#;

const EN_JSON: &str = r#"
{
  "messages.new_event": "New event! \n\nName: {name}.\nTime: {time}\nDescription: {description}",
  "messages.report_suffix": "\n\nThis event must be closed with a report!!!",
  "messages.reminder": "Reminder! \n\nName: {name}.\nTime: {time}\nDescription: {description}",
  "messages.periodic_reminder": "Reminder! \n\nName: {name}.\nDescription: {description}\n\nThis is a recurring event!",
  "report.saved": "The report for event \"{name}\" has been saved!",
  "report.not_saved": "The report for event \"{name}\" could not be saved. Please contact an administrator to store the report!",
  "report.unnamed": "This looks like an unnamed event. Please contact an administrator to store the report!",
  "report.error": "Failed to store the report!",
  "event.created": "Event created successfully!",
  "event.deleted": "Event deleted!",
  "not_found.event": "Event not found",
  "not_found.studio": "Studio not found"
}
"#;

/// Initialize translations map (lazy).
fn build_translations() -> HashMap<String, HashMap<String, String>> {
    let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();

    let ru_map: HashMap<String, String> = serde_json::from_str(RU_JSON).unwrap_or_else(|e| {
        panic!("failed to parse RU_JSON in i18n module: {}", e);
    });
    out.insert("ru".to_string(), ru_map);

    let en_map: HashMap<String, String> = serde_json::from_str(EN_JSON).unwrap_or_else(|e| {
        panic!("failed to parse EN_JSON in i18n module: {}", e);
    });
    out.insert("en".to_string(), en_map);

    out
}

/// Returns the global translations map (lang -> (key -> message)).
fn translations() -> &'static HashMap<String, HashMap<String, String>> {
    TRANSLATIONS.get_or_init(build_translations)
}

/// Normalize a language tag into a short, lowercase code (e.g. "en-US" -> "en").
pub fn normalize_language(lang: &str) -> String {
    lang.split('-').next().unwrap_or(lang).to_lowercase()
}

/// Returns true if the given language code is supported by the backend i18n
/// translations (e.g. "ru", "en").
pub fn is_supported_language(lang: &str) -> bool {
    translations().contains_key(lang)
}

/// Translate a key using an explicit language (or default if None).
///
/// - `lang`: optional language code (`"ru"`, `"en"`, ...). If None, DEFAULT_LANG is used.
/// - `key`: translation key (flat string, e.g. "messages.reminder").
/// - `params`: optional slice of (name, value) for placeholder replacement.
///   Replacements use single-brace placeholders `{name}`.
///
/// Returns the translated and parameter-substituted string. If no translation is
/// found, returns a sensible fallback (default language value or the key itself).
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let map = translations();

    let desired = lang.unwrap_or(DEFAULT_LANG);

    let val = map
        .get(desired)
        .and_then(|m| m.get(key))
        .cloned()
        // Fallback to default language
        .or_else(|| map.get(DEFAULT_LANG).and_then(|m| m.get(key)).cloned())
        // If still missing, return the key itself (useful in logs)
        .unwrap_or_else(|| key.to_string());

    if let Some(params) = params {
        let mut s = val;
        for (k, v) in params {
            s = s.replace(&format!("{{{}}}", k), v);
        }
        s
    } else {
        val
    }
}

/// Convenience wrapper: translate using default language (DEFAULT_LANG).
pub fn t(key: &str) -> String {
    tr(None, key, None)
}

/// Convenience wrapper with params (default language).
pub fn t_with(key: &str, params: &[(&str, &str)]) -> String {
    tr(None, key, Some(params))
}
