//! Streamline reordering of the vector lists.
//!
//! An algebraic dependency orients the half-edge matrices of a level; the
//! wave ordering then partitions the vectors into a front block (sources),
//! a cut block (feedback vertices) and a back block (sinks) and rewrites
//! the level's vector order accordingly.

use log::{debug, warn};

use crate::error::AlgebraError;
use crate::topology::MultiGrid;

use super::VectorId;

/// Layout produced by the wave ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    /// First-cuts-first-cuts-last-level-last: cut waves interleave with the
    /// front block.
    Fcfcll,
    /// Front-front-cuts-cuts-last-last: cut vertices gather in a middle
    /// block.
    Ffccll,
}

/// Level selection for [`MultiGrid::order_vectors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderLevels {
    All,
    Top,
}

/// Orients the half-edge matrices of one grid level.
pub trait AlgebraicDependency {
    /// Sets the up/down flags on every matrix of the level.
    ///
    /// # Errors
    ///
    /// Returns an error when the orientation cannot be computed.
    fn orient(&self, mg: &mut MultiGrid, level: usize) -> Result<(), AlgebraError>;
}

/// Lexicographic dependency: a matrix points down when its tail's
/// coordinate tuple is smaller under the chosen axis priority.
#[derive(Debug, Clone)]
pub struct LexDependency {
    index: [usize; 3],
}

impl LexDependency {
    /// Parses an axis priority such as `"xyz"` or `"yzx"`. Anything else
    /// falls back to `xyz` with a warning.
    #[must_use]
    pub fn new(spec: &str) -> Self {
        let mut index = [0_usize; 3];
        let mut seen = [false; 3];
        let mut valid = spec.len() == 3;
        if valid {
            for (i, c) in spec.chars().enumerate() {
                match c {
                    'x' => {
                        index[i] = 0;
                        seen[0] = true;
                    }
                    'y' => {
                        index[i] = 1;
                        seen[1] = true;
                    }
                    'z' => {
                        index[i] = 2;
                        seen[2] = true;
                    }
                    _ => valid = false,
                }
            }
        }
        if !valid || !seen.iter().all(|&s| s) {
            warn!("use default lex order: xyz");
            index = [0, 1, 2];
        }
        Self { index }
    }
}

impl AlgebraicDependency for LexDependency {
    fn orient(&self, mg: &mut MultiGrid, level: usize) -> Result<(), AlgebraError> {
        let vector_list = mg.grids[level].vectors.clone();
        for &vector in &vector_list {
            let begin = mg.vector_position(vector);
            for connection in mg.vectors[vector].connections.clone() {
                let (dest, half) = mg.connections[connection].half_from(vector);
                if dest == vector {
                    continue;
                }
                let end = mg.vector_position(dest);

                let mut flags = 0_u8;
                for &axis in &self.index {
                    flags = u8::from(begin[axis] < end[axis])
                        | (u8::from(begin[axis] > end[axis]) << 1);
                    if flags != 0 {
                        break;
                    }
                }

                let dir = &mut mg.connections[connection].dirs[half];
                dir.up = false;
                dir.down = false;
                match flags {
                    0 => {}
                    1 => dir.down = true,
                    2 => dir.up = true,
                    _ => return Err(AlgebraError::OrderingCorrupted),
                }
            }
        }
        Ok(())
    }
}

impl MultiGrid {
    /// Collects every not yet visited vector of the level as a cut.
    fn feedback_vertex_vectors(&mut self, level: usize, cuts: &mut Vec<VectorId>) -> usize {
        let mut n = 0;
        let vector_list = self.grids[level].vectors.clone();
        for vector in vector_list {
            if !self.vectors[vector].cut_used {
                self.vectors[vector].cut_used = true;
                cuts.push(vector);
                n += 1;
            }
        }
        n
    }

    /// Reorders the level's vector list by alternating source and sink
    /// waves with feedback-vertex cuts.
    #[allow(clippy::too_many_lines)]
    fn order_vectors_algebraic(
        &mut self,
        level: usize,
        mode: OrderMode,
    ) -> Result<(), AlgebraError> {
        let vector_list = self.grids[level].vectors.clone();
        let n = vector_list.len();
        if n == 0 {
            return Ok(());
        }
        debug!("ordering {n} vectors on level {level}");

        let mut list: Vec<VectorId> = vec![VectorId::default(); n];
        let mut cut_list: Vec<VectorId> = Vec::new();

        // count upward and downward matrices per vector
        for &vector in &vector_list {
            self.vectors[vector].cut_used = false;
            let mut up = 0;
            let mut down = 0;
            for &connection in &self.vectors[vector].connections {
                let (dest, half) = self.connections[connection].half_from(vector);
                if dest == vector {
                    continue;
                }
                if self.connections[connection].dirs[half].up {
                    up += 1;
                }
                if self.connections[connection].dirs[half].down {
                    down += 1;
                }
            }
            self.vectors[vector].up = up;
            self.vectors[vector].down = down;
        }

        // the initial front and back sets
        #[allow(clippy::cast_possible_wrap)]
        let n_signed = n as isize;
        let mut first_next_in: isize = 0;
        let mut first_next_out: isize = 0;
        let mut last_next_in: isize = n_signed - 1;
        let mut last_next_out: isize = n_signed - 1;
        #[allow(clippy::cast_sign_loss)]
        let at = |i: isize| i as usize;

        for &vector in &vector_list {
            if self.vectors[vector].up == 0 {
                list[at(first_next_in)] = vector;
                first_next_in += 1;
                self.vectors[vector].cut_used = true;
            } else if self.vectors[vector].down == 0 {
                list[at(last_next_in)] = vector;
                last_next_in -= 1;
                self.vectors[vector].cut_used = true;
            }
        }

        let mut cut_total: isize = 0;
        while first_next_in + cut_total <= last_next_in {
            // drain the front: successors of placed sources
            while first_next_out < first_next_in {
                let vector = list[at(first_next_out)];
                first_next_out += 1;
                for connection in self.vectors[vector].connections.clone() {
                    let (dest, half) = self.connections[connection].half_from(vector);
                    if dest == vector
                        || self.vectors[dest].cut_used
                        || !self.connections[connection].dirs[half].down
                    {
                        continue;
                    }
                    let k = self.vectors[dest].up;
                    debug_assert!(k > 0);
                    self.vectors[dest].up = k - 1;
                    if k == 1 {
                        list[at(first_next_in)] = dest;
                        first_next_in += 1;
                        self.vectors[dest].cut_used = true;
                    }
                }
            }

            // drain the back: predecessors of placed sinks
            while last_next_in < last_next_out {
                let vector = list[at(last_next_out)];
                last_next_out -= 1;
                for connection in self.vectors[vector].connections.clone() {
                    let (dest, half) = self.connections[connection].half_from(vector);
                    if dest == vector
                        || self.vectors[dest].cut_used
                        || !self.connections[connection].dirs[half].up
                    {
                        continue;
                    }
                    let k = self.vectors[dest].down;
                    debug_assert!(k > 0);
                    self.vectors[dest].down = k - 1;
                    if k == 1 {
                        list[at(last_next_in)] = dest;
                        last_next_in -= 1;
                        self.vectors[dest].cut_used = true;
                    }
                }
            }

            if first_next_in + cut_total > last_next_in {
                break;
            }

            // feedback vertex set
            match mode {
                OrderMode::Fcfcll => {
                    let mut cuts = Vec::new();
                    let ncut = self.feedback_vertex_vectors(level, &mut cuts);
                    if ncut == 0 {
                        return Err(AlgebraError::NoCutVector);
                    }
                    first_next_out = first_next_in;
                    for (i, &cut) in cuts.iter().enumerate() {
                        list[at(first_next_in) + i] = cut;
                    }
                    #[allow(clippy::cast_possible_wrap)]
                    {
                        first_next_in += ncut as isize;
                    }

                    // cut vertices release their sinks immediately
                    for &cut in &cuts {
                        for connection in self.vectors[cut].connections.clone() {
                            let (dest, half) = self.connections[connection].half_from(cut);
                            if dest == cut
                                || self.vectors[dest].cut_used
                                || !self.connections[connection].dirs[half].up
                            {
                                continue;
                            }
                            let k = self.vectors[dest].down;
                            debug_assert!(k > 0);
                            self.vectors[dest].down = k - 1;
                            if k == 1 {
                                list[at(last_next_in)] = dest;
                                last_next_in -= 1;
                                self.vectors[dest].cut_used = true;
                            }
                        }
                    }
                }
                OrderMode::Ffccll => {
                    let before = cut_list.len();
                    let ncut = self.feedback_vertex_vectors(level, &mut cut_list);
                    if ncut == 0 {
                        return Err(AlgebraError::NoCutVector);
                    }
                    for &cut in &cut_list[before..] {
                        for connection in self.vectors[cut].connections.clone() {
                            let (dest, half) = self.connections[connection].half_from(cut);
                            if dest == cut || self.vectors[dest].cut_used {
                                continue;
                            }
                            if self.connections[connection].dirs[half].down {
                                let k = self.vectors[dest].up;
                                debug_assert!(k > 0);
                                self.vectors[dest].up = k - 1;
                                if k == 1 {
                                    list[at(first_next_in)] = dest;
                                    first_next_in += 1;
                                    self.vectors[dest].cut_used = true;
                                }
                            } else if self.connections[connection].dirs[half].up {
                                let k = self.vectors[dest].down;
                                debug_assert!(k > 0);
                                self.vectors[dest].down = k - 1;
                                if k == 1 {
                                    list[at(last_next_in)] = dest;
                                    last_next_in -= 1;
                                    self.vectors[dest].cut_used = true;
                                }
                            }
                        }
                    }
                    #[allow(clippy::cast_possible_wrap)]
                    {
                        cut_total += ncut as isize;
                    }
                }
            }
        }

        // every vector must have been placed exactly once
        if last_next_in - first_next_in - cut_total != -1 {
            return Err(AlgebraError::OrderingCorrupted);
        }

        let order: Vec<VectorId> = match mode {
            OrderMode::Fcfcll => list,
            OrderMode::Ffccll => {
                let mut order = Vec::with_capacity(n);
                order.extend_from_slice(&list[..at(first_next_in)]);
                order.extend_from_slice(&cut_list);
                order.extend_from_slice(&list[at(last_next_in + 1)..]);
                order
            }
        };

        for (i, &vector) in order.iter().enumerate() {
            self.vectors[vector].index = i + 1;
        }
        self.grids[level].vectors = order;

        Ok(())
    }

    /// Orders the vectors of the selected levels by the streamline scheme
    /// induced by the dependency.
    ///
    /// # Errors
    ///
    /// Returns an error when the dependency fails or the ordering does not
    /// cover every vector.
    pub fn order_vectors(
        &mut self,
        levels: OrderLevels,
        mode: OrderMode,
        dependency: &dyn AlgebraicDependency,
    ) -> Result<(), AlgebraError> {
        let base = match levels {
            OrderLevels::All => 0,
            OrderLevels::Top => self.top_level(),
        };
        for level in base..self.grids.len() {
            dependency.orient(self, level)?;
            self.order_vectors_algebraic(level, mode)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::algebra::Format;
    use crate::math::Point3;

    fn unit_tet_grid() -> MultiGrid {
        let mut mg = MultiGrid::new(Format::nodal(0));
        let nodes = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
        .map(|p| mg.insert_inner_node(p));
        mg.insert_tetrahedron(nodes, [None, None, None, None]).unwrap();
        mg.create_all_connections().unwrap();
        mg
    }

    #[test]
    fn lex_ordering_sorts_by_coordinates() {
        let mut mg = unit_tet_grid();
        let dep = LexDependency::new("xyz");
        mg.order_vectors(OrderLevels::All, OrderMode::Fcfcll, &dep)
            .unwrap();

        let order = mg.level_vectors(0).to_vec();
        assert_eq!(order.len(), 4);
        for pair in order.windows(2) {
            let a = mg.vector_position(pair[0]);
            let b = mg.vector_position(pair[1]);
            assert!(
                (a.x, a.y, a.z) <= (b.x, b.y, b.z),
                "vectors not in lexicographic order"
            );
        }
        for (i, &vector) in order.iter().enumerate() {
            assert_eq!(mg.vectors[vector].index, i + 1);
        }
    }

    #[test]
    fn lex_priority_yzx_changes_the_order() {
        let mut mg = unit_tet_grid();
        let dep = LexDependency::new("yzx");
        mg.order_vectors(OrderLevels::All, OrderMode::Ffccll, &dep)
            .unwrap();

        let order = mg.level_vectors(0).to_vec();
        assert_eq!(order.len(), 4);
        for pair in order.windows(2) {
            let a = mg.vector_position(pair[0]);
            let b = mg.vector_position(pair[1]);
            assert!((a.y, a.z, a.x) <= (b.y, b.z, b.x));
        }
    }

    #[test]
    fn invalid_priority_falls_back_to_xyz() {
        let dep = LexDependency::new("abc");
        let mut mg = unit_tet_grid();
        mg.order_vectors(OrderLevels::All, OrderMode::Fcfcll, &dep)
            .unwrap();
        assert_eq!(mg.level_vectors(0).len(), 4);
    }

    /// Orients every half both ways; no sources or sinks exist, so the
    /// whole level lands in the cut block.
    struct CyclicDependency;

    impl AlgebraicDependency for CyclicDependency {
        fn orient(&self, mg: &mut MultiGrid, level: usize) -> Result<(), AlgebraError> {
            let vector_list = mg.grids[level].vectors.clone();
            for &vector in &vector_list {
                for connection in mg.vectors[vector].connections.clone() {
                    let (dest, half) = mg.connections[connection].half_from(vector);
                    if dest == vector {
                        continue;
                    }
                    mg.connections[connection].dirs[half].up = true;
                    mg.connections[connection].dirs[half].down = true;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn fully_cyclic_graph_becomes_one_cut_block() {
        let mut mg = unit_tet_grid();
        mg.order_vectors(OrderLevels::All, OrderMode::Ffccll, &CyclicDependency)
            .unwrap();
        assert_eq!(mg.level_vectors(0).len(), 4);
    }
}
