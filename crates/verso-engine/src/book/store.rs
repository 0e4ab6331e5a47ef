//! Book persistence: text, binary and compressed database files.
//!
//! The text and binary variants hold the same record per node: the two
//! canonical key words, both minimax scores, the deviation move and score,
//! and the flag word. The compressed variant stores no keys at all: the
//! DAG is laid out in preorder with separate child-count and child-move
//! arrays, and unpacking reconstructs the keys by replaying the moves.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use tracing::info;

use verso_core::{Color, Square};

use super::node::{BLACK_TO_MOVE, NOT_TRAVERSED};
use super::{Book, BookNode, ROOT};
use crate::error::BookError;
use crate::search::SearchCore;

/// Magic values of the book file formats.
pub const BOOK_MAGIC1: i16 = 2718;
pub const BOOK_MAGIC2: i16 = 2818;

fn open_error(path: &str, source: std::io::Error) -> BookError {
    BookError::InvalidFile { path: path.to_string(), source }
}

fn read_i16(stream: &mut impl Read, path: &str) -> Result<i16, BookError> {
    let mut bytes = [0u8; 2];
    stream.read_exact(&mut bytes).map_err(|source| open_error(path, source))?;
    Ok(i16::from_ne_bytes(bytes))
}

fn read_u16(stream: &mut impl Read, path: &str) -> Result<u16, BookError> {
    let mut bytes = [0u8; 2];
    stream.read_exact(&mut bytes).map_err(|source| open_error(path, source))?;
    Ok(u16::from_ne_bytes(bytes))
}

fn read_i32(stream: &mut impl Read, path: &str) -> Result<i32, BookError> {
    let mut bytes = [0u8; 4];
    stream.read_exact(&mut bytes).map_err(|source| open_error(path, source))?;
    Ok(i32::from_ne_bytes(bytes))
}

fn read_node(stream: &mut impl Read, path: &str) -> Result<BookNode, BookError> {
    Ok(BookNode {
        hash_val1: read_i32(stream, path)?,
        hash_val2: read_i32(stream, path)?,
        black_minimax_score: read_i16(stream, path)?,
        white_minimax_score: read_i16(stream, path)?,
        best_alternative_move: read_i16(stream, path)?,
        alternative_score: read_i16(stream, path)?,
        flags: read_u16(stream, path)?,
    })
}

fn write_node(stream: &mut impl Write, node: &BookNode) -> std::io::Result<()> {
    stream.write_all(&node.hash_val1.to_ne_bytes())?;
    stream.write_all(&node.hash_val2.to_ne_bytes())?;
    stream.write_all(&node.black_minimax_score.to_ne_bytes())?;
    stream.write_all(&node.white_minimax_score.to_ne_bytes())?;
    stream.write_all(&node.best_alternative_move.to_ne_bytes())?;
    stream.write_all(&node.alternative_score.to_ne_bytes())?;
    stream.write_all(&node.flags.to_ne_bytes())
}

impl Book {
    /// Replace the book contents with `nodes`, rebuilding the index.
    fn adopt_nodes(&mut self, nodes: Vec<BookNode>) {
        self.nodes = nodes;
        self.ensure_capacity(self.nodes.len().max(1));
    }

    /// Read an ASCII database file.
    pub fn read_text_database(&mut self, path: &str) -> Result<(), BookError> {
        let file = File::open(path).map_err(|source| open_error(path, source))?;
        let reader = BufReader::new(file);
        let mut tokens = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|source| open_error(path, source))?;
            tokens.extend(line.split_whitespace().map(str::to_string));
        }
        let mut cursor = tokens.iter();
        let mut next_number = |what: &str| -> Result<i64, BookError> {
            cursor
                .next()
                .ok_or_else(|| BookError::FormatError {
                    path: path.to_string(),
                    reason: format!("missing {what}"),
                })?
                .parse::<i64>()
                .map_err(|_| BookError::FormatError {
                    path: path.to_string(),
                    reason: format!("malformed {what}"),
                })
        };

        let magic1 = next_number("magic")?;
        let magic2 = next_number("magic")?;
        if magic1 != BOOK_MAGIC1 as i64 || magic2 != BOOK_MAGIC2 as i64 {
            return Err(BookError::BadMagic { path: path.to_string() });
        }

        let count = next_number("node count")? as usize;
        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            nodes.push(BookNode {
                hash_val1: next_number("hash")? as i32,
                hash_val2: next_number("hash")? as i32,
                black_minimax_score: next_number("score")? as i16,
                white_minimax_score: next_number("score")? as i16,
                best_alternative_move: next_number("move")? as i16,
                alternative_score: next_number("score")? as i16,
                flags: next_number("flags")? as u16,
            });
        }
        self.adopt_nodes(nodes);
        info!(path, nodes = self.node_count(), "read text opening database");
        Ok(())
    }

    /// Write the database as ASCII.
    pub fn write_text_database(&self, path: &str) -> Result<(), BookError> {
        let file = File::create(path).map_err(|source| open_error(path, source))?;
        let mut writer = BufWriter::new(file);
        let emit = |writer: &mut BufWriter<File>| -> std::io::Result<()> {
            writeln!(writer, "{BOOK_MAGIC1}\n{BOOK_MAGIC2}")?;
            writeln!(writer, "{}", self.node_count())?;
            for node in &self.nodes {
                writeln!(
                    writer,
                    "{} {} {} {} {} {} {}",
                    node.hash_val1,
                    node.hash_val2,
                    node.black_minimax_score,
                    node.white_minimax_score,
                    node.best_alternative_move,
                    node.alternative_score,
                    node.flags
                )?;
            }
            Ok(())
        };
        emit(&mut writer).map_err(|source| open_error(path, source))?;
        info!(path, nodes = self.node_count(), "wrote text opening database");
        Ok(())
    }

    /// Read a binary database file.
    pub fn read_binary_database(&mut self, path: &str) -> Result<(), BookError> {
        let file = File::open(path).map_err(|source| open_error(path, source))?;
        let mut stream = BufReader::new(file);

        if read_i16(&mut stream, path)? != BOOK_MAGIC1
            || read_i16(&mut stream, path)? != BOOK_MAGIC2
        {
            return Err(BookError::BadMagic { path: path.to_string() });
        }

        let count = read_i32(&mut stream, path)? as usize;
        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            nodes.push(read_node(&mut stream, path)?);
        }
        self.adopt_nodes(nodes);
        info!(path, nodes = self.node_count(), "read binary opening database");
        Ok(())
    }

    /// Write the database in binary form.
    pub fn write_binary_database(&self, path: &str) -> Result<(), BookError> {
        let file = File::create(path).map_err(|source| open_error(path, source))?;
        let mut stream = BufWriter::new(file);
        let emit = |stream: &mut BufWriter<File>| -> std::io::Result<()> {
            stream.write_all(&BOOK_MAGIC1.to_ne_bytes())?;
            stream.write_all(&BOOK_MAGIC2.to_ne_bytes())?;
            stream.write_all(&(self.node_count() as i32).to_ne_bytes())?;
            for node in &self.nodes {
                write_node(stream, node)?;
            }
            Ok(())
        };
        emit(&mut stream).map_err(|source| open_error(path, source))?;
        info!(path, nodes = self.node_count(), "wrote binary opening database");
        Ok(())
    }

    /// Merge a binary database into the current book. New positions are
    /// adopted as-is; known positions are replaced when the imported node
    /// carries strictly better endgame information. The tree is
    /// re-minimaxed afterwards.
    pub fn merge_binary_database(
        &mut self,
        core: &mut SearchCore,
        path: &str,
    ) -> Result<usize, BookError> {
        let file = File::open(path).map_err(|source| open_error(path, source))?;
        let mut stream = BufReader::new(file);

        if read_i16(&mut stream, path)? != BOOK_MAGIC1
            || read_i16(&mut stream, path)? != BOOK_MAGIC2
        {
            return Err(BookError::BadMagic { path: path.to_string() });
        }

        let merge_count = read_i32(&mut stream, path)? as usize;
        let mut merge_use_count = 0;
        for _ in 0..merge_count {
            let merge_node = read_node(&mut stream, path)?;
            match self.probe_hash(merge_node.hash_val1, merge_node.hash_val2) {
                None => {
                    let index =
                        self.create_node(merge_node.hash_val1, merge_node.hash_val2, 0);
                    *self.node_mut(index) = merge_node;
                    merge_use_count += 1;
                }
                Some(index) => {
                    let existing = self.node(index);
                    let better_endgame = (merge_node.is_full_solved()
                        && !existing.is_full_solved())
                        || (merge_node.is_wld_solved() && !existing.is_wld_solved());
                    if better_endgame {
                        *self.node_mut(index) = merge_node;
                        merge_use_count += 1;
                    }
                }
            }
        }

        // Make sure the tree is in reasonably good shape after the merge.
        self.minimax_tree(core);
        info!(path, used = merge_use_count, total = merge_count, "merged binary database");
        Ok(merge_use_count)
    }

    /// Preorder layout of the reachable tree for the compressed format.
    fn do_compress(
        &mut self,
        core: &mut SearchCore,
        index: usize,
        node_order: &mut Vec<usize>,
        child_count: &mut Vec<i16>,
        child_list: &mut Vec<i16>,
    ) {
        if self.node(index).flags & NOT_TRAVERSED == 0 {
            return;
        }
        node_order.push(index);

        let side = self.node(index).side_to_move();
        let children = self.children(core, side);
        let mut local_children: Vec<(Square, usize)> = Vec::new();
        for (sq, child) in children {
            if self.node(child).flags & NOT_TRAVERSED == 0 {
                continue;
            }
            if local_children.iter().any(|&(_, seen)| seen == child) {
                continue;
            }
            local_children.push((sq, child));
            child_list.push(sq.pos() as i16);
        }
        child_count.push(local_children.len() as i16);

        for (sq, child) in local_children {
            core.pos.refresh_piece_counts();
            core.pos.make_move(side, sq, true);
            self.do_compress(core, child, node_order, child_count, child_list);
            core.pos.unmake_move(side, sq);
        }

        self.node_mut(index).flags ^= NOT_TRAVERSED;
    }

    /// Write the compressed database: node and child counts followed by
    /// the per-node fields in preorder, without position keys.
    pub fn write_compressed_database(
        &mut self,
        core: &mut SearchCore,
        path: &str,
    ) -> Result<(), BookError> {
        let file = File::create(path).map_err(|source| open_error(path, source))?;
        let mut stream = BufWriter::new(file);

        Book::prepare_traversal(core);
        self.mark_all_not_traversed();

        let mut node_order = Vec::with_capacity(self.node_count());
        let mut child_count = Vec::with_capacity(self.node_count());
        let mut child_list = Vec::new();
        if !self.is_empty() {
            self.do_compress(core, ROOT, &mut node_order, &mut child_count, &mut child_list);
        }

        let emit = |stream: &mut BufWriter<File>| -> std::io::Result<()> {
            // Only reachable nodes appear in the preorder layout.
            stream.write_all(&(node_order.len() as i32).to_ne_bytes())?;
            stream.write_all(&(child_list.len() as i32).to_ne_bytes())?;
            for count in &child_count {
                stream.write_all(&count.to_ne_bytes())?;
            }
            for mv in &child_list {
                stream.write_all(&mv.to_ne_bytes())?;
            }
            for &index in &node_order {
                let node = self.node(index);
                stream.write_all(&node.black_minimax_score.to_ne_bytes())?;
                stream.write_all(&node.white_minimax_score.to_ne_bytes())?;
            }
            for &index in &node_order {
                stream.write_all(&self.node(index).best_alternative_move.to_ne_bytes())?;
            }
            for &index in &node_order {
                stream.write_all(&self.node(index).alternative_score.to_ne_bytes())?;
            }
            for &index in &node_order {
                stream.write_all(&self.node(index).flags.to_ne_bytes())?;
            }
            Ok(())
        };
        emit(&mut stream).map_err(|source| open_error(path, source))?;
        info!(path, nodes = node_order.len(), "wrote compressed database");
        Ok(())
    }

    /// Reconstruct a binary database from a compressed one by replaying
    /// the stored move tree and recomputing the canonical keys.
    pub fn unpack_compressed_database(
        &self,
        core: &mut SearchCore,
        in_path: &str,
        out_path: &str,
    ) -> Result<(), BookError> {
        let file = File::open(in_path).map_err(|source| open_error(in_path, source))?;
        let mut stream = BufReader::new(file);

        let node_count = read_i32(&mut stream, in_path)? as usize;
        let child_list_size = read_i32(&mut stream, in_path)? as usize;

        let mut child_count = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            child_count.push(read_i16(&mut stream, in_path)?);
        }
        let mut child_list = Vec::with_capacity(child_list_size);
        for _ in 0..child_list_size {
            child_list.push(read_i16(&mut stream, in_path)?);
        }
        let mut black_score = Vec::with_capacity(node_count);
        let mut white_score = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            black_score.push(read_i16(&mut stream, in_path)?);
            white_score.push(read_i16(&mut stream, in_path)?);
        }
        let mut alt_move = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            alt_move.push(read_i16(&mut stream, in_path)?);
        }
        let mut alt_score = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            alt_score.push(read_i16(&mut stream, in_path)?);
        }
        let mut flags = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            flags.push(read_u16(&mut stream, in_path)?);
        }

        let out_file = File::create(out_path).map_err(|source| open_error(out_path, source))?;
        let mut out = BufWriter::new(out_file);

        Book::prepare_traversal(core);

        out.write_all(&BOOK_MAGIC1.to_ne_bytes())
            .and_then(|()| out.write_all(&BOOK_MAGIC2.to_ne_bytes()))
            .and_then(|()| out.write_all(&(node_count as i32).to_ne_bytes()))
            .map_err(|source| open_error(out_path, source))?;

        let mut node_index = 0usize;
        let mut child_index = 0usize;
        self.do_uncompress(
            core,
            &mut out,
            &mut node_index,
            &mut child_index,
            &child_count,
            &child_list,
            &black_score,
            &white_score,
            &alt_move,
            &alt_score,
            &flags,
        )
        .map_err(|source| open_error(out_path, source))?;

        info!(in_path, out_path, nodes = node_count, "unpacked compressed database");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn do_uncompress(
        &self,
        core: &mut SearchCore,
        out: &mut impl Write,
        node_index: &mut usize,
        child_index: &mut usize,
        child_count: &[i16],
        child_list: &[i16],
        black_score: &[i16],
        white_score: &[i16],
        alt_move: &[i16],
        alt_score: &[i16],
        flags: &[u16],
    ) -> std::io::Result<()> {
        let this_node = *node_index;
        let side = if flags[this_node] & BLACK_TO_MOVE != 0 {
            Color::Black
        } else {
            Color::White
        };

        let saved_child_count = child_count[this_node] as usize;
        let saved_child_index = *child_index;
        *child_index += saved_child_count;

        // Write the record for the current node, keys recomputed from the
        // replayed position.
        let (val1, val2, _) = self.canonical(&core.pos);
        out.write_all(&val1.to_ne_bytes())?;
        out.write_all(&val2.to_ne_bytes())?;
        out.write_all(&black_score[this_node].to_ne_bytes())?;
        out.write_all(&white_score[this_node].to_ne_bytes())?;
        out.write_all(&alt_move[this_node].to_ne_bytes())?;
        out.write_all(&alt_score[this_node].to_ne_bytes())?;
        out.write_all(&flags[this_node].to_ne_bytes())?;

        *node_index += 1;

        for i in 0..saved_child_count {
            let raw = child_list[saved_child_index + i];
            let sq = Square::from_pos(raw as usize).expect("stored move is a board square");
            core.pos.refresh_piece_counts();
            let flipped = core.pos.make_move_no_hash(side, sq);
            debug_assert!(flipped > 0, "stored move must stay legal");
            self.do_uncompress(
                core,
                out,
                node_index,
                child_index,
                child_count,
                child_list,
                black_score,
                white_score,
                alt_move,
                alt_score,
                flags,
            )?;
            core.pos.unmake_move_no_hash(side, sq);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{BLACK_TO_MOVE, Book, FULL_SOLVED, WHITE_TO_MOVE};

    fn temp_path(name: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("verso-book-{}-{name}", std::process::id()));
        path.to_string_lossy().into_owned()
    }

    fn sample_book() -> Book {
        let mut book = Book::new();
        let root = book.create_node(1001, 2002, BLACK_TO_MOVE);
        book.node_mut(root).black_minimax_score = 128;
        book.node_mut(root).white_minimax_score = 128;
        let child = book.create_node(3003, 4004, WHITE_TO_MOVE | FULL_SOLVED);
        book.node_mut(child).black_minimax_score = -2;
        book.node_mut(child).white_minimax_score = -2;
        book
    }

    #[test]
    fn text_database_roundtrip() {
        let book = sample_book();
        let path = temp_path("text.db");
        book.write_text_database(&path).unwrap();

        let mut restored = Book::new();
        restored.read_text_database(&path).unwrap();
        assert_eq!(restored.node_count(), book.node_count());
        assert_eq!(restored.node(0), book.node(0));
        assert_eq!(restored.node(1), book.node(1));
        assert_eq!(restored.probe_hash(3003, 4004), Some(1));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn binary_database_roundtrip() {
        let book = sample_book();
        let path = temp_path("binary.db");
        book.write_binary_database(&path).unwrap();

        let mut restored = Book::new();
        restored.read_binary_database(&path).unwrap();
        assert_eq!(restored.node_count(), book.node_count());
        assert_eq!(restored.node(0), book.node(0));
        assert_eq!(restored.node(1), book.node(1));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn bad_magic_is_rejected() {
        let path = temp_path("bad.db");
        std::fs::write(&path, "1 2 0\n").unwrap();
        let mut book = Book::new();
        assert!(matches!(
            book.read_text_database(&path),
            Err(crate::error::BookError::BadMagic { .. })
        ));
        std::fs::remove_file(&path).ok();
    }
}
