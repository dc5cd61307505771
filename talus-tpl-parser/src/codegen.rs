// MIT License
//
// Copyright (c) 2024 Jerome Johnson
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.


//! Flattening of the syntax tree into the instruction stream
//!
//! Layout of an iteration without an empty branch:
//!
//! ```text
//! open{skip: close + 1}  body…  close{body: open + 1}
//! ```
//!
//! and with one:
//!
//! ```text
//! open{skip: else + 1}  body…  else{body: open + 1, end: close + 1}  empty…  close{body: open + 1}
//! ```
//!
//! A condition chains its branches through `next` and leaves through `end`, the
//! index of its `EndIf`.

use crate::{ast::Node, program::Instruction};

fn push(instructions: &mut Vec<Instruction>, instruction: Instruction) -> usize {
    instructions.push(instruction);
    instructions.len() - 1
}

fn emit_into(nodes: Vec<Node>, instructions: &mut Vec<Instruction>) {
    for node in nodes {
        match node {
            Node::Text(text) => {
                push(instructions, Instruction::Text(text));
            }
            Node::Print(expr) => {
                push(instructions, Instruction::Print(expr));
            }
            Node::Set {
                name,
                subscripts,
                value,
            } => {
                push(
                    instructions,
                    Instruction::Set {
                        name,
                        subscripts,
                        value,
                    },
                );
            }
            Node::Include { target, once, kind } => {
                push(instructions, Instruction::Include { target, once, kind });
            }
            Node::If { branches, otherwise } => {
                let mut heads = Vec::with_capacity(branches.len() + 1);
                for (at, (cond, body)) in branches.into_iter().enumerate() {
                    let head = match at {
                        0 => Instruction::If { cond, next: 0 },
                        _ => Instruction::ElseIf { cond, next: 0, end: 0 },
                    };
                    heads.push(push(instructions, head));
                    emit_into(body, instructions);
                }
                if let Some(otherwise) = otherwise {
                    heads.push(push(instructions, Instruction::Else { end: 0 }));
                    emit_into(otherwise, instructions);
                }
                let end = push(instructions, Instruction::EndIf);
                for (at, head) in heads.iter().enumerate() {
                    let following = heads.get(at + 1).copied().unwrap_or(end);
                    match &mut instructions[*head] {
                        Instruction::If { next, .. } => *next = following,
                        Instruction::ElseIf { next, end: exit, .. } => {
                            *next = following;
                            *exit = end;
                        }
                        Instruction::Else { end: exit } => *exit = end,
                        _ => (),
                    }
                }
            }
            Node::Each {
                id,
                alias,
                source,
                body,
                empty,
            } => {
                let open = push(
                    instructions,
                    Instruction::BlockOpen {
                        id,
                        alias,
                        source,
                        skip: 0,
                    },
                );
                emit_into(body, instructions);
                let skip = match empty {
                    Some(empty) => {
                        let otherwise = push(
                            instructions,
                            Instruction::BlockElse {
                                id,
                                body: open + 1,
                                end: 0,
                            },
                        );
                        emit_into(empty, instructions);
                        let close = push(instructions, Instruction::BlockClose { id, body: open + 1 });
                        if let Instruction::BlockElse { end, .. } = &mut instructions[otherwise] {
                            *end = close + 1;
                        }
                        otherwise + 1
                    }
                    None => push(instructions, Instruction::BlockClose { id, body: open + 1 }) + 1,
                };
                if let Instruction::BlockOpen { skip: target, .. } = &mut instructions[open] {
                    *target = skip;
                }
            }
        }
    }
}

pub(crate) fn emit(nodes: Vec<Node>) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    emit_into(nodes, &mut instructions);
    instructions
}

/// Drops empty text and merges adjacent text. With `whitespace` set, text made
/// only of whitespace between two directives is dropped as well. Jump targets are
/// remapped onto the surviving instructions.
pub(crate) fn compact(instructions: Vec<Instruction>, whitespace: bool) -> Vec<Instruction> {
    let directive = |at: usize| instructions.get(at).is_some_and(Instruction::is_directive);
    let mut remap = Vec::with_capacity(instructions.len() + 1);
    let mut kept: Vec<Instruction> = Vec::with_capacity(instructions.len());
    for (at, instruction) in instructions.iter().enumerate() {
        remap.push(kept.len());
        if let Instruction::Text(text) = instruction {
            if text.is_empty() {
                continue;
            }
            if whitespace && text.trim().is_empty() && at > 0 && directive(at - 1) && directive(at + 1) {
                continue;
            }
            if let Some(Instruction::Text(previous)) = kept.last_mut() {
                previous.push_str(text);
                continue;
            }
        }
        kept.push(instruction.clone());
    }
    remap.push(kept.len());
    for instruction in &mut kept {
        instruction.retarget(|target| remap[target]);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Access, Condition, Expr, Piece, Reference, Source};

    fn var(name: &str) -> Expr {
        Expr::Access(Access {
            reference: Reference::Var(name.to_string()),
            subscripts: vec![],
        })
    }

    fn cond(text: &str) -> Condition {
        Condition {
            pieces: vec![Piece::Text(text.to_string())],
        }
    }

    #[test]
    fn links_condition_branches() {
        let instructions = emit(vec![Node::If {
            branches: vec![
                (cond("a"), vec![Node::Text("A".to_string())]),
                (cond("b"), vec![Node::Text("B".to_string())]),
            ],
            otherwise: Some(vec![Node::Text("C".to_string())]),
        }]);
        assert_eq!(instructions[0], Instruction::If { cond: cond("a"), next: 2 });
        assert_eq!(
            instructions[2],
            Instruction::ElseIf {
                cond: cond("b"),
                next: 4,
                end: 6
            }
        );
        assert_eq!(instructions[4], Instruction::Else { end: 6 });
        assert_eq!(instructions[6], Instruction::EndIf);
    }

    #[test]
    fn links_iteration_with_empty_branch() {
        let instructions = emit(vec![Node::Each {
            id: 1,
            alias: "item".to_string(),
            source: Source::Collection(var("ITEMS")),
            body: vec![Node::Print(var("X"))],
            empty: Some(vec![Node::Text("none".to_string())]),
        }]);
        assert!(matches!(instructions[0], Instruction::BlockOpen { skip: 3, .. }));
        assert_eq!(
            instructions[2],
            Instruction::BlockElse {
                id: 1,
                body: 1,
                end: 5
            }
        );
        assert_eq!(instructions[4], Instruction::BlockClose { id: 1, body: 1 });
    }

    #[test]
    fn links_iteration() {
        let instructions = emit(vec![Node::Each {
            id: 1,
            alias: "item".to_string(),
            source: Source::Collection(var("ITEMS")),
            body: vec![Node::Print(var("X"))],
            empty: None,
        }]);
        assert!(matches!(instructions[0], Instruction::BlockOpen { skip: 3, .. }));
        assert_eq!(instructions[2], Instruction::BlockClose { id: 1, body: 1 });
    }

    #[test]
    fn compacts_and_remaps() {
        let instructions = vec![
            Instruction::If { cond: cond("a"), next: 4 },
            Instruction::Text("\n  ".to_string()),
            Instruction::Print(var("X")),
            Instruction::Text("\n".to_string()),
            Instruction::EndIf,
            Instruction::Text("a".to_string()),
            Instruction::Text("".to_string()),
            Instruction::Text("b".to_string()),
        ];
        let loose = compact(instructions.clone(), false);
        assert_eq!(loose.len(), 6);
        assert_eq!(loose[5], Instruction::Text("ab".to_string()));
        assert_eq!(loose[0], Instruction::If { cond: cond("a"), next: 4 });

        let tight = compact(instructions, true);
        assert_eq!(tight.len(), 4);
        assert_eq!(tight[0], Instruction::If { cond: cond("a"), next: 2 });
        assert_eq!(tight[3], Instruction::Text("ab".to_string()));
    }
}
