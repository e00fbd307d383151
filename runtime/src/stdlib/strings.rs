//! String family: served for primitive-string receivers and for heap
//! objects whose class is `String`.

use crate::stdlib::{
    ClassFamily, NativeCall, NativeCtx, NativeRegistry, NativeResult, arg_i64, arg_string,
    arg_value, fmt,
};
use crate::vm::Value;
use regex::Regex;

pub(super) fn do_register_string_natives(registry: &mut NativeRegistry) {
    let f = ClassFamily::Str;
    registry.register(f, "<init>", string_init);
    registry.register(f, "length", string_length);
    registry.register(f, "charAt", string_char_at);
    registry.register(f, "codePointAt", string_code_point_at);
    registry.register(f, "substring", string_substring);
    registry.register(f, "indexOf", string_index_of);
    registry.register(f, "lastIndexOf", string_last_index_of);
    registry.register(f, "contains", string_contains);
    registry.register(f, "startsWith", string_starts_with);
    registry.register(f, "endsWith", string_ends_with);
    registry.register(f, "toLowerCase", string_to_lower);
    registry.register(f, "toUpperCase", string_to_upper);
    registry.register(f, "trim", string_trim);
    registry.register(f, "strip", string_trim);
    registry.register(f, "stripLeading", string_strip_leading);
    registry.register(f, "stripTrailing", string_strip_trailing);
    registry.register(f, "isBlank", string_is_blank);
    registry.register(f, "isEmpty", string_is_empty);
    registry.register(f, "repeat", string_repeat);
    registry.register(f, "concat", string_concat);
    registry.register(f, "replace", string_replace);
    registry.register(f, "replaceAll", string_replace_all);
    registry.register(f, "replaceFirst", string_replace_first);
    registry.register(f, "matches", string_matches);
    registry.register(f, "equals", string_equals);
    registry.register(f, "equalsIgnoreCase", string_equals_ignore_case);
    registry.register(f, "compareTo", string_compare_to);
    registry.register(f, "compareToIgnoreCase", string_compare_to_ignore_case);
    registry.register(f, "hashCode", string_hash_code);
    registry.register(f, "toString", string_to_string);
    registry.register(f, "intern", string_to_string);
    registry.register(f, "toCharArray", string_to_char_array);
    registry.register(f, "split", string_split);
    registry.register(f, "valueOf", string_value_of);
    registry.register(f, "format", string_format);
    registry.register(f, "join", string_join);
    registry.register(f, "copyValueOf", string_copy_value_of);
    registry.register(f, "getBytes", string_get_bytes);
}

/// The canonical 32-bit signed fold: `h = 31*h + c` over UTF-16 units.
pub fn java_string_hash(s: &str) -> i32 {
    let mut h: i32 = 0;
    for unit in s.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    h
}

fn chars_of(s: &str) -> Vec<char> {
    s.chars().collect()
}

/// Char-indexed substring search, -1 when absent.
fn char_index_of(haystack: &str, needle: &str, from: i64) -> i64 {
    let hay = chars_of(haystack);
    let needle = chars_of(needle);
    let start = from.max(0) as usize;
    if needle.is_empty() {
        return start.min(hay.len()) as i64;
    }
    if hay.len() < needle.len() {
        return -1;
    }
    for i in start..=(hay.len() - needle.len()) {
        if hay[i..i + needle.len()] == needle[..] {
            return i as i64;
        }
    }
    -1
}

/// `new String(...)` turns the freshly allocated object into a heap
/// string carrying the argument's text.
fn string_init(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let text = call
        .args
        .first()
        .and_then(|v| ctx.string_of(v))
        .unwrap_or_default();
    if let Some(object) = ctx
        .receiver_id(call)
        .and_then(|id| ctx.state.heap.get_mut(id))
    {
        object.kind = crate::heap::HeapKind::Str;
        object.string_value = Some(text);
    }
    Ok(None)
}

fn string_length(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    Ok(Some(Value::Int(s.chars().count() as i64)))
}

fn string_char_at(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let index = arg_i64(call, 0);
    let c = usize::try_from(index)
        .ok()
        .and_then(|i| s.chars().nth(i))
        .unwrap_or('\0');
    Ok(Some(Value::Char(c)))
}

fn string_code_point_at(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let index = arg_i64(call, 0);
    let code = usize::try_from(index)
        .ok()
        .and_then(|i| s.chars().nth(i))
        .map(|c| c as i64)
        .unwrap_or(0);
    Ok(Some(Value::Int(code)))
}

fn string_substring(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let chars = chars_of(&ctx.receiver_string(call));
    let begin = arg_i64(call, 0).clamp(0, chars.len() as i64) as usize;
    let end = if call.args.len() > 1 {
        arg_i64(call, 1).clamp(begin as i64, chars.len() as i64) as usize
    } else {
        chars.len()
    };
    Ok(Some(Value::Str(chars[begin..end].iter().collect())))
}

fn string_index_of(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let needle = arg_string(ctx, call, 0);
    let from = if call.args.len() > 1 { arg_i64(call, 1) } else { 0 };
    Ok(Some(Value::Int(char_index_of(&s, &needle, from))))
}

fn string_last_index_of(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let needle = arg_string(ctx, call, 0);
    let mut found = -1;
    let mut from = 0;
    loop {
        let at = char_index_of(&s, &needle, from);
        if at < 0 {
            break;
        }
        found = at;
        from = at + 1;
    }
    Ok(Some(Value::Int(found)))
}

fn string_contains(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let needle = arg_string(ctx, call, 0);
    Ok(Some(Value::Bool(s.contains(&needle))))
}

fn string_starts_with(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let prefix = arg_string(ctx, call, 0);
    Ok(Some(Value::Bool(s.starts_with(&prefix))))
}

fn string_ends_with(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let suffix = arg_string(ctx, call, 0);
    Ok(Some(Value::Bool(s.ends_with(&suffix))))
}

fn string_to_lower(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Str(ctx.receiver_string(call).to_lowercase())))
}

fn string_to_upper(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Str(ctx.receiver_string(call).to_uppercase())))
}

fn string_trim(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Str(ctx.receiver_string(call).trim().to_string())))
}

fn string_strip_leading(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Str(
        ctx.receiver_string(call).trim_start().to_string(),
    )))
}

fn string_strip_trailing(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Str(
        ctx.receiver_string(call).trim_end().to_string(),
    )))
}

fn string_is_blank(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    Ok(Some(Value::Bool(s.trim().is_empty())))
}

fn string_is_empty(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(ctx.receiver_string(call).is_empty())))
}

fn string_repeat(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let count = arg_i64(call, 0).max(0) as usize;
    Ok(Some(Value::Str(s.repeat(count))))
}

fn string_concat(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let other = arg_string(ctx, call, 0);
    Ok(Some(Value::Str(format!("{}{}", s, other))))
}

fn string_replace(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let from = arg_string(ctx, call, 0);
    let to = arg_string(ctx, call, 1);
    if from.is_empty() {
        return Ok(Some(Value::Str(s)));
    }
    Ok(Some(Value::Str(s.replace(&from, &to))))
}

fn string_replace_all(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let pattern = arg_string(ctx, call, 0);
    let replacement = arg_string(ctx, call, 1);
    let replaced = match Regex::new(&pattern) {
        Ok(re) => re.replace_all(&s, replacement.as_str()).into_owned(),
        Err(_) => s,
    };
    Ok(Some(Value::Str(replaced)))
}

fn string_replace_first(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let pattern = arg_string(ctx, call, 0);
    let replacement = arg_string(ctx, call, 1);
    let replaced = match Regex::new(&pattern) {
        Ok(re) => re.replace(&s, replacement.as_str()).into_owned(),
        Err(_) => s,
    };
    Ok(Some(Value::Str(replaced)))
}

fn string_matches(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let pattern = arg_string(ctx, call, 0);
    // matches() is anchored over the whole string
    let matched = Regex::new(&format!("^(?:{})$", pattern))
        .map(|re| re.is_match(&s))
        .unwrap_or(false);
    Ok(Some(Value::Bool(matched)))
}

fn string_equals(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let other = call.args.first().and_then(|v| ctx.string_of(v));
    Ok(Some(Value::Bool(other.as_deref() == Some(s.as_str()))))
}

fn string_equals_ignore_case(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call).to_lowercase();
    let other = call
        .args
        .first()
        .and_then(|v| ctx.string_of(v))
        .map(|o| o.to_lowercase());
    Ok(Some(Value::Bool(other.as_deref() == Some(s.as_str()))))
}

fn string_compare_to(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let other = arg_string(ctx, call, 0);
    let ordering = s.cmp(&other) as i64;
    Ok(Some(Value::Int(ordering)))
}

fn string_compare_to_ignore_case(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call).to_lowercase();
    let other = arg_string(ctx, call, 0).to_lowercase();
    Ok(Some(Value::Int(s.cmp(&other) as i64)))
}

fn string_hash_code(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    Ok(Some(Value::Int(i64::from(java_string_hash(&s)))))
}

fn string_to_string(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Str(ctx.receiver_string(call))))
}

fn string_to_char_array(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let step = ctx.step();
    let values: Vec<Value> = s.chars().map(Value::Char).collect();
    let id = ctx.state.heap.alloc_array_from("char", values, step);
    Ok(Some(Value::ArrayRef {
        id,
        elem: "char".to_string(),
    }))
}

fn string_split(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let pattern = arg_string(ctx, call, 0);
    let limit = if call.args.len() > 1 { arg_i64(call, 1) } else { 0 };

    let mut parts: Vec<String> = match Regex::new(&pattern) {
        Ok(re) => {
            if limit > 0 {
                re.splitn(&s, limit as usize).map(str::to_string).collect()
            } else {
                re.split(&s).map(str::to_string).collect()
            }
        }
        Err(_) => vec![s.clone()],
    };
    // Java drops trailing empty strings when the limit is zero
    if limit == 0 {
        while parts.last().is_some_and(|p| p.is_empty()) {
            parts.pop();
        }
    }
    Ok(Some(ctx.alloc_string_array(parts)))
}

fn string_value_of(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = arg_value(call, 0);
    Ok(Some(Value::Str(ctx.display(&value))))
}

fn string_format(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let format = arg_string(ctx, call, 0);
    let rest = call.args.get(1..).unwrap_or(&[]);
    Ok(Some(Value::Str(fmt::java_format(
        &ctx.state.heap,
        &format,
        rest,
    ))))
}

fn string_join(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let delimiter = arg_string(ctx, call, 0);
    let mut parts = Vec::new();
    // either join(delim, array) or join(delim, a, b, c)
    if call.args.len() == 2 {
        if let Some(id) = call.args[1].object_id() {
            if let Some(elements) = ctx
                .state
                .heap
                .get(id)
                .and_then(|o| o.array_elements.clone())
            {
                for element in &elements {
                    parts.push(ctx.display(element));
                }
                return Ok(Some(Value::Str(parts.join(&delimiter))));
            }
        }
    }
    for value in call.args.iter().skip(1) {
        parts.push(ctx.display(value));
    }
    Ok(Some(Value::Str(parts.join(&delimiter))))
}

fn string_copy_value_of(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let mut out = String::new();
    if let Some(id) = arg_value(call, 0).object_id() {
        if let Some(elements) = ctx.state.heap.get(id).and_then(|o| o.array_elements.clone()) {
            for element in elements {
                match element {
                    Value::Char(c) => out.push(c),
                    other => out.push_str(&ctx.display(&other)),
                }
            }
        }
    }
    Ok(Some(Value::Str(out)))
}

/// UTF-16 code units as ints.
fn string_get_bytes(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let s = ctx.receiver_string(call);
    let step = ctx.step();
    let values: Vec<Value> = s.encode_utf16().map(|u| Value::Int(i64::from(u))).collect();
    let id = ctx.state.heap.alloc_array_from("byte", values, step);
    Ok(Some(Value::ArrayRef {
        id,
        elem: "byte".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", 0)]
    #[case("a", 97)]
    #[case("ab", 3105)]
    #[case("hello", 99162322)]
    #[case("Hello, World!", 1498789909)]
    fn hash_matches_the_canonical_fold(#[case] s: &str, #[case] expected: i32) {
        assert_eq!(java_string_hash(s), expected);
        // deterministic
        assert_eq!(java_string_hash(s), java_string_hash(s));
    }

    #[rstest]
    #[case("banana", "na", 0, 2)]
    #[case("banana", "na", 3, 4)]
    #[case("banana", "x", 0, -1)]
    #[case("", "", 0, 0)]
    fn char_indexed_search(
        #[case] hay: &str,
        #[case] needle: &str,
        #[case] from: i64,
        #[case] expected: i64,
    ) {
        assert_eq!(char_index_of(hay, needle, from), expected);
    }
}
