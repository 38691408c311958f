//! String Interpolation Utilities
//!
//! Scoped placeholder replacement for script environment templates.

/// Interpolate `{scope:key}` placeholders in a template string
///
/// `lookup` receives the scope and key of each placeholder. Placeholders it
/// cannot resolve are removed. Braces without a scope are left untouched, and
/// substituted values are never re-scanned.
///
/// # Example
/// ```ignore
/// let out = interpolate("dir={unit:dir}", |scope, key| match (scope, key) {
///     ("unit", "dir") => Some("/srv/space/greet".to_string()),
///     _ => None,
/// });
/// // out == "dir=/srv/space/greet"
/// ```
pub fn interpolate<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str, &str) -> Option<String>,
{
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };

        let placeholder = &after[..end];
        if placeholder.contains('{') {
            result.push('{');
            rest = after;
            continue;
        }

        match placeholder.split_once(':') {
            Some((scope, key)) => {
                if let Some(value) = lookup(scope, key) {
                    result.push_str(&value);
                }
            }
            None => {
                result.push('{');
                result.push_str(placeholder);
                result.push('}');
            }
        }

        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}
