//! Label reading and complement search
//!
//! Searches run over plain nop-modifier sequences so they can be tested
//! without an engine. Non-nop slots are `None`.

use super::{Hardware, Variant};
use crate::head::{Head, HeadId};
use crate::inst::InstFlags;
use crate::label::CodeLabel;

/// Does `label` match the nops at `[offset, offset + label.len())`?
#[inline]
fn matches_at(label: &CodeLabel, mods: &[Option<u8>], offset: usize) -> bool {
    (0..label.len()).all(|m| mods.get(offset + m).copied().flatten() == Some(label.get(m)))
}

/// Search forward from `pos` (the position of the label being read). The
/// scan starts past the label and steps in label-sized strides, checking
/// every offset inside each nop run it lands in. Returns the position just
/// past the match, or -1.
pub fn find_label_forward(label: &CodeLabel, mods: &[Option<u8>], pos: i32) -> i32 {
    let size = label.len() as i32;
    let len = mods.len() as i32;
    let search_start = pos;
    let mut pos = pos + size;
    let mut found = false;

    while pos >= 0 && pos < len {
        if mods[pos as usize].is_some() {
            let mut start = pos;
            let mut end = pos + 1;
            while start > search_start && mods[(start - 1) as usize].is_some() {
                start -= 1;
            }
            while end < len && mods[end as usize].is_some() {
                end += 1;
            }

            let max_offset = end - start - size + 1;
            for offset in start..start + max_offset {
                if matches_at(label, mods, offset as usize) {
                    pos = size + offset;
                    found = true;
                    break;
                }
            }
            if found {
                break;
            }
            pos = end;
        }
        pos += size;
    }

    if found {
        pos
    } else {
        -1
    }
}

/// Mirror of `find_label_forward`, scanning toward the front from `pos`
/// (the position before the label being read).
pub fn find_label_backward(label: &CodeLabel, mods: &[Option<u8>], pos: i32) -> i32 {
    let size = label.len() as i32;
    let len = mods.len() as i32;
    let search_start = pos;
    let mut pos = pos - size;
    let mut found = false;

    while pos >= 0 {
        if pos < len && mods[pos as usize].is_some() {
            let mut start = pos;
            let mut end = pos + 1;
            while start > 0 && mods[(start - 1) as usize].is_some() {
                start -= 1;
            }
            while end < search_start && end < len && mods[end as usize].is_some() {
                end += 1;
            }

            let max_offset = end - start - size + 1;
            for offset in start..start + max_offset {
                if matches_at(label, mods, offset as usize) {
                    pos = end;
                    found = true;
                    break;
                }
            }
            if found {
                break;
            }
            pos = start - 1;
        }
        pos -= size;
    }

    if found {
        pos
    } else {
        -1
    }
}

/// Exact search used by injection: the first nop run anywhere in memory
/// whose whole length spells `label`. Returns the position after the run
/// (which may equal the memory length), or -1.
pub fn find_label_full(label: &CodeLabel, mods: &[Option<u8>]) -> i32 {
    let len = mods.len();
    let mut pos = 0usize;
    while pos < len {
        if mods[pos].is_none() {
            pos += 1;
            continue;
        }
        let mut size = 0;
        let mut matched = true;
        while pos < len {
            let Some(m) = mods[pos] else { break };
            if size < label.len() && label.get(size) != m {
                matched = false;
            }
            pos += 1;
            size += 1;
        }
        if size == label.len() && matched {
            return pos as i32;
        }
    }
    -1
}

impl<V: Variant> Hardware<V> {
    /// Nop modifiers of a memory space, `None` for non-nops.
    pub(crate) fn nop_mods(&self, space: usize) -> Vec<Option<u8>> {
        self.spaces
            .get(space)
            .map(|mem| mem.iter().map(|i| self.inst_set.nop_mod(i)).collect())
            .unwrap_or_default()
    }

    /// Read the nops following the IP into `next_label`, consuming them.
    /// Only the first `max_label_exe_size` are flagged executed.
    pub fn read_label(&mut self) {
        self.read_label_max(crate::label::MAX_LABEL_SIZE);
    }

    pub fn read_label_max(&mut self, max_size: usize) {
        self.cur_mut().next_label.clear();
        let mut count = 0;
        let exe_size = self.config.max_label_exe_size;
        while count < max_size {
            let next = self.next_inst(HeadId::Ip);
            let Some(nop_mod) = self.inst_set.nop_mod(next) else {
                break;
            };
            count += 1;
            self.advance_head(HeadId::Ip);
            self.cur_mut().next_label.add_nop(nop_mod);
            if self.cur().next_label.len() <= exe_size {
                self.set_head_flag(HeadId::Ip, InstFlags::EXECUTED);
            }
        }
    }

    /// Rotate `next_label` into its complement.
    pub fn complement_next_label(&mut self) {
        let t = self.cur_mut();
        t.next_label.rotate(V::COMPLEMENT_SHIFT, V::NUM_NOPS);
    }

    /// Find `next_label` from the IP: forward (1), backward (-1) or from
    /// the start of memory (0). The returned head sits on the last nop of
    /// the match; on a miss, or with an empty label, it is the IP itself.
    pub fn find_label(&self, direction: i32) -> Head {
        let ip = self.ip();
        let label = &self.cur().next_label;
        if label.is_empty() {
            return ip;
        }
        let mods = self.nop_mods(ip.space);
        let found = match direction {
            d if d < 0 => find_label_backward(label, &mods, ip.pos - label.len() as i32),
            d if d > 0 => find_label_forward(label, &mods, ip.pos),
            _ => find_label_forward(label, &mods, 0),
        };
        if found < 0 {
            return ip;
        }
        let mut head = ip;
        head.set(found - 1, self.space_len(ip.space));
        head
    }

    /// Scan memory from just past the IP for `marker` followed by nops
    /// spelling `next_label` exactly and then a non-nop. Returns the
    /// marker position.
    pub(crate) fn find_marked_label(&self, marker: &str) -> Option<usize> {
        let marker = self.inst_set.inst(marker)?;
        let label = self.cur().next_label.clone();
        let ip = self.ip();
        let mem = &self.spaces[ip.space];
        let len = mem.len();
        if len == 0 {
            return None;
        }
        let mods = self.nop_mods(ip.space);

        let start = (ip.index() + 1) % len;
        for step in 0..len {
            let pos = (start + step) % len;
            if mem.get(pos) != marker {
                continue;
            }
            let mut size = 0;
            while size < label.len() {
                let at = (pos + 1 + size) % len;
                if mods[at] != Some(label.get(size)) {
                    break;
                }
                size += 1;
            }
            if size == label.len() && mods[(pos + 1 + size) % len].is_none() {
                return Some(pos);
            }
        }
        None
    }

    /// Walk a head forward from the IP looking for `marker` and the label
    /// after it, stepping back one slot when a failed match stopped on a
    /// non-nop. `exact` requires the whole label followed by a non-nop;
    /// otherwise a mismatching nop is the only rejection, so a shorter run
    /// still matches. Gives up after two passes over memory.
    pub(crate) fn walk_to_marker(&self, marker: &str, exact: bool) -> Option<usize> {
        let marker = self.inst_set.inst(marker)?;
        let label = self.cur().next_label.clone();
        let ip = self.ip();
        let len = self.space_len(ip.space);
        if len == 0 {
            return None;
        }
        let mem = &self.spaces[ip.space];
        let nop = |h: &Head| self.inst_set.nop_mod(mem.get(h.index()));

        let start_pos = ip.pos;
        let mut search = ip;
        search.advance(len);
        let mut steps = 0;
        while search.pos != start_pos && steps <= 2 * len + 2 {
            steps += 1;
            if mem.get(search.index()) == marker {
                let marker_pos = search.index();
                search.advance(len);
                let mut size = 0;
                let mut matched = true;
                while size < label.len() {
                    let Some(m) = nop(&search) else { break };
                    if m != label.get(size) {
                        matched = false;
                        if exact {
                            break;
                        }
                    }
                    search.advance(len);
                    size += 1;
                    if !matched {
                        break;
                    }
                }
                let hit = if exact {
                    matched && size == label.len() && nop(&search).is_none()
                } else {
                    matched
                };
                if hit {
                    return Some(marker_pos);
                }
                if nop(&search).is_none() {
                    search.retreat(len);
                }
            }
            search.advance(len);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HardwareConfig;
    use crate::context::Context;
    use crate::hardware::cpu::Cpu;
    use crate::hardware::smt::Smt;
    use crate::hardware::test_util::factory;
    use crate::hardware::HardwareFactory;
    use crate::label::MAX_LABEL_SIZE;

    /// `.` is a non-nop, letters are nops.
    fn mods(s: &str) -> Vec<Option<u8>> {
        s.chars()
            .map(|c| if c == '.' { None } else { Some(c as u8 - b'A') })
            .collect()
    }

    fn label(s: &str) -> CodeLabel {
        s.parse().unwrap()
    }

    /// Every label over `base` nops of length `len`.
    fn all_labels(base: usize, len: usize) -> Vec<Vec<u8>> {
        let mut out = vec![Vec::new()];
        for _ in 0..len {
            out = out
                .into_iter()
                .flat_map(|l| {
                    (0..base as u8).map(move |n| {
                        let mut next = l.clone();
                        next.push(n);
                        next
                    })
                })
                .collect();
        }
        out
    }

    /// Lay out `sep label sep sep complement sep sep`, read the label from
    /// the IP and search forward. The match must be the complement run.
    fn assert_complement_found<V: Variant>(f: &HardwareFactory<V>, sep: &str, nops: &[u8]) {
        let set = f.inst_set();
        let sep = set.inst(sep).unwrap();
        let mut complement = CodeLabel::from_nops(nops);
        complement.rotate(V::COMPLEMENT_SHIFT, V::NUM_NOPS);

        let mut g = vec![sep];
        g.extend(nops.iter().map(|&n| set.nop_inst(n).unwrap()));
        g.extend([sep, sep]);
        g.extend(complement.nops().iter().map(|&n| set.nop_inst(n).unwrap()));
        g.extend([sep, sep]);

        let mut hw = f.create(&g);
        hw.read_label();
        assert_eq!(hw.cur().next_label.nops(), nops);
        hw.complement_next_label();
        let found = hw.find_label(1);

        let start = nops.len() + 3;
        assert_eq!(found.pos as usize, start + nops.len() - 1, "label {:?}", nops);
        let run: Vec<u8> = (start..start + nops.len())
            .map(|i| set.nop_mod(hw.memory().get(i)).unwrap())
            .collect();
        assert_eq!(run, complement.nops(), "label {:?}", nops);
    }

    /// Exhaustive for short labels, sampled for the long ones.
    fn check_round_trip<V: Variant>(sep: &str) {
        let f = factory::<V>(HardwareConfig::default());
        let mut ctx = Context::new(5);
        for len in 1..=MAX_LABEL_SIZE {
            if len <= 6 {
                for nops in all_labels(V::NUM_NOPS, len) {
                    assert_complement_found(&f, sep, &nops);
                }
            } else {
                for _ in 0..200 {
                    let nops: Vec<u8> = (0..len).map(|_| ctx.uint(V::NUM_NOPS) as u8).collect();
                    assert_complement_found(&f, sep, &nops);
                }
            }
        }
    }

    #[test]
    fn test_label_complement_round_trip_cpu() {
        check_round_trip::<Cpu>("inc");
    }

    #[test]
    fn test_label_complement_round_trip_smt() {
        check_round_trip::<Smt>("Val-Inc");
    }

    #[test]
    fn test_forward_finds_first_match() {
        let m = mods(".CA.CC...AB..AB");
        assert_eq!(find_label_forward(&label("AB"), &m, 1), 11);
    }

    #[test]
    fn test_forward_match_nested_in_longer_run() {
        let m = mods(".C..CABC.");
        assert_eq!(find_label_forward(&label("AB"), &m, 1), 7);
    }

    #[test]
    fn test_forward_miss() {
        let m = mods(".CA.CC..");
        assert_eq!(find_label_forward(&label("AB"), &m, 1), -1);
    }

    #[test]
    fn test_backward_finds_nearest_before() {
        let m = mods("AB..AB..CA.");
        assert_eq!(find_label_backward(&label("AB"), &m, 8 - 2), 6);
    }

    #[test]
    fn test_backward_miss() {
        let m = mods("..CC..CA.");
        assert_eq!(find_label_backward(&label("AB"), &m, 7 - 2), -1);
    }

    #[test]
    fn test_full_requires_whole_run() {
        let m = mods("..ABC..AB.");
        assert_eq!(find_label_full(&label("AB"), &m), 9);
        assert_eq!(find_label_full(&label("ABC"), &m), 5);
        assert_eq!(find_label_full(&label("BC"), &m), -1);
    }

    #[test]
    fn test_full_match_at_end_of_memory() {
        let m = mods("...AB");
        assert_eq!(find_label_full(&label("AB"), &m), 5);
    }
}
