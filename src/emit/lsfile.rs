//! Fanuc `.LS` file structure
//!
//! One `LsFile` per output file: header attributes, the numbered `/MN`
//! instruction section and the `/POS` position section, rendered in the
//! fixed head-to-tail grammar the controller loader expects. The
//! `LINE_COUNT` attribute is only known once the file closes, so it is
//! resolved at render time rather than written up front.

use std::collections::HashSet;

/// Maximum program-name length Fanuc accepts
const MAX_NAME_LEN: usize = 36;

/// Normalize a program name: uppercase, spaces and hyphens become
/// underscores, capped at the controller limit.
pub fn file_name(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .take(MAX_NAME_LEN)
        .collect()
}

/// Pick the first unused `BASE_<n>` name by linear probing among the
/// sibling names already taken. The suffix counts toward the length cap,
/// so the base is shortened to make room when needed.
pub fn sub_file_name(base: &str, existing: &HashSet<String>) -> String {
    let mut n = 1u32;
    loop {
        let suffix = format!("_{}", n);
        let keep = MAX_NAME_LEN.saturating_sub(suffix.len());
        let mut candidate: String = base.chars().take(keep).collect();
        candidate.push_str(&suffix);
        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[derive(Debug)]
pub struct LsFile {
    pub name: String,
    comment: String,
    timestamp: String,
    default_group: String,
    mn: Vec<String>,
    pos: Vec<String>,
    /// Next /MN instruction number
    line: u32,
}

impl LsFile {
    pub fn new(name: &str, comment: &str, timestamp: &str, default_group: &str) -> Self {
        Self {
            name: name.to_string(),
            comment: comment.to_string(),
            timestamp: timestamp.to_string(),
            default_group: default_group.to_string(),
            mn: Vec::new(),
            pos: Vec::new(),
            line: 1,
        }
    }

    /// Number of instructions emitted so far
    pub fn line_count(&self) -> u32 {
        self.line - 1
    }

    /// Append one numbered instruction, ` ;` terminated.
    pub fn add_line(&mut self, body: &str) {
        self.mn.push(format!("{:4}:  {} ;", self.line, body));
        self.line += 1;
    }

    /// Append a circular move: the arc middle on the numbered line, the
    /// arc end on an unnumbered continuation line indented 7 spaces. The
    /// pair consumes one instruction number.
    pub fn add_circular(&mut self, middle: &str, end: &str) {
        self.mn.push(format!("{:4}:  {}", self.line, middle));
        self.mn.push(format!("       {} ;", end));
        self.line += 1;
    }

    /// Append one `P[n]{ ... };` position block, already formatted.
    pub fn add_position(&mut self, block: Vec<String>) {
        self.pos.extend(block);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("/PROG  {}\n", self.name));
        out.push_str("/ATTR\n");
        out.push_str("OWNER\t\t= MNEDITOR;\n");
        out.push_str(&format!("COMMENT\t\t= \"{}\";\n", self.comment));
        out.push_str("PROG_SIZE\t= 0;\n");
        out.push_str(&format!("CREATE\t\t= DATE {};\n", self.timestamp));
        out.push_str(&format!("MODIFIED\t= DATE {};\n", self.timestamp));
        out.push_str("FILE_NAME\t= ;\n");
        out.push_str("VERSION\t\t= 0;\n");
        out.push_str(&format!("LINE_COUNT\t= {};\n", self.line_count()));
        out.push_str("MEMORY_SIZE\t= 0;\n");
        out.push_str("PROTECT\t\t= READ_WRITE;\n");
        out.push_str("TCD:  STACK_SIZE\t= 0,\n");
        out.push_str("      TASK_PRIORITY\t= 50,\n");
        out.push_str("      TIME_SLICE\t= 0,\n");
        out.push_str("      BUSY_LAMP_OFF\t= 0,\n");
        out.push_str("      ABORT_REQUEST\t= 0,\n");
        out.push_str("      PAUSE_REQUEST\t= 0;\n");
        out.push_str(&format!("DEFAULT_GROUP\t= {};\n", self.default_group));
        out.push_str("CONTROL_CODE\t= 00000000 00000000;\n");
        out.push_str("/MN\n");
        for line in &self.mn {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("/POS\n");
        for line in &self.pos {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("/END\n");
        out
    }
}
