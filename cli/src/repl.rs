use rustyline::{DefaultEditor, error::ReadlineError};
use starling_core::{FileOptions, StringDict, exec_repl_chunk};

use crate::loader::{ModuleLoader, stdout_thread};
use crate::report;

fn print_repl_help() {
    eprintln!("Commands: :quit | :exit | :q, :help, :globals");
}

/// Whether `buf` is an incomplete chunk: an open bracket, a trailing
/// backslash, or a block header (`def f():`) not yet closed by a blank line.
pub(crate) fn should_continue_multiline(buf: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut in_comment = false;
    for ch in buf.chars() {
        if in_comment {
            in_comment = ch != '\n';
            continue;
        }
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q || ch == '\n' {
                quote = None;
            }
            continue;
        }
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '"' | '\'' => quote = Some(ch),
            '#' => in_comment = true,
            _ => {}
        }
    }
    if depth > 0 || buf.trim_end().ends_with('\\') {
        return true;
    }
    let opens_block = buf.lines().any(|line| line.trim_end().ends_with(':'));
    opens_block && !buf.ends_with("\n\n")
}

pub fn run(options: FileOptions) -> anyhow::Result<()> {
    let mut thread = stdout_thread(options).with_name("repl");
    ModuleLoader::new(None, options).install(&mut thread);
    let mut globals = StringDict::new();

    // In-memory line editor with history and arrow key support
    let mut rl = DefaultEditor::new()?;

    print_repl_help();

    loop {
        let mut acc = String::new();
        // Read one or more lines until the chunk is complete
        loop {
            let prompt = if acc.is_empty() { ">>> " } else { "... " };
            match rl.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim_end();

                    // Commands only when starting fresh
                    if acc.is_empty() && trimmed.starts_with(':') {
                        match trimmed {
                            ":quit" | ":exit" | ":q" => return Ok(()),
                            ":help" => print_repl_help(),
                            ":globals" => {
                                for name in globals.sorted_keys() {
                                    println!("{name} = {}", globals[name].repr());
                                }
                            }
                            _ => eprintln!("Unknown command. Type :help for help."),
                        }
                        break;
                    }

                    acc.push_str(trimmed);
                    acc.push('\n');
                    if !should_continue_multiline(&acc) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C: drop the pending chunk
                    acc.clear();
                    eprintln!("^C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl-D: exit if nothing pending; otherwise submit
                    if acc.trim().is_empty() {
                        println!();
                        return Ok(());
                    }
                    break;
                }
                Err(e) => {
                    eprintln!("Readline error: {e}");
                    continue;
                }
            }
        }

        if acc.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(acc.trim_end());

        match exec_repl_chunk(&mut thread, &acc, &mut globals) {
            Ok(Some(value)) => println!("{}", value.repr()),
            Ok(None) => {}
            Err(err) => eprintln!("{}", report(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::should_continue_multiline;

    #[test]
    fn test_complete_single_lines() {
        assert!(!should_continue_multiline("x = 1\n"));
        assert!(!should_continue_multiline("print('(')\n"));
        assert!(!should_continue_multiline("x = 1  # [unclosed\n"));
    }

    #[test]
    fn test_open_brackets_continue() {
        assert!(should_continue_multiline("x = [1,\n"));
        assert!(should_continue_multiline("f(a,\n  b=[1\n"));
        assert!(!should_continue_multiline("f(a,\n  b=[1])\n"));
        assert!(should_continue_multiline("x = 1 + \\\n"));
    }

    #[test]
    fn test_blocks_end_with_blank_line() {
        assert!(should_continue_multiline("def f():\n"));
        assert!(should_continue_multiline("def f():\n    return 1\n"));
        assert!(!should_continue_multiline("def f():\n    return 1\n\n"));
        assert!(!should_continue_multiline("d = {'a': 1}\n"));
    }
}
