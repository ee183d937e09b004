use crate::TaskError;

/// Expands a command template for the given node locations.
///
/// `%N` becomes the shell-quoted locations separated by spaces and `%%` a
/// literal `%`; any other `%` sequence is kept as written.
pub fn expand_template<S: AsRef<str>>(
    template: &str,
    locations: &[S],
) -> std::result::Result<String, TaskError> {
    let quoted = shlex::try_join(locations.iter().map(AsRef::as_ref)).map_err(|e| TaskError::Spawn {
        command: template.to_string(),
        reason: e.to_string(),
    })?;

    let mut cmdline = String::with_capacity(template.len() + quoted.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            cmdline.push(c);
            continue;
        }
        match chars.peek() {
            Some('N') => {
                chars.next();
                cmdline.push_str(&quoted);
            }
            Some('%') => {
                chars.next();
                cmdline.push('%');
            }
            _ => cmdline.push('%'),
        }
    }
    Ok(cmdline)
}
