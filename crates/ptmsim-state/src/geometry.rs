//! Work decomposition for the contraction and gather primitives.
//!
//! A group (block) computes a tile of output coordinates and batches a number
//! of spectator slices (`block[2]`) that share the same matrix. Backends are
//! free to map a group onto whatever execution unit they have; the CPU
//! backend hands each group to one rayon task.

/// Threads per group for gathers.
pub const GATHER_GROUP_SIZE: usize = 256;

/// How a primitive call is split into groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchGeometry {
    /// `grid` groups of `block[0] * block[1] * block[2]` output elements.
    Tiled {
        /// Group shape: `(b_out, a_out, spectators)` for contractions.
        block: [usize; 3],
        /// Number of groups.
        grid: usize,
        /// Scratch memory per group, in bytes.
        shared_mem_bytes: usize,
    },
    /// The output has no free axes; copy the input wholesale.
    WholeCopy,
}

impl LaunchGeometry {
    /// Geometry for a joint contraction over two axes.
    ///
    /// Spectators are batched by multiplying the smallest remaining axis
    /// lengths for as long as the group stays within `max_threads`.
    pub fn two_axis(
        new_shape: &[usize],
        axes: (usize, usize),
        dims_out: (usize, usize),
        dims_in: (usize, usize),
        max_threads: usize,
    ) -> Self {
        let mut rest: Vec<usize> = new_shape.to_vec();
        rest[axes.0] = 1;
        rest[axes.1] = 1;
        rest.sort_unstable();

        let limit = max_threads / (dims_out.0 * dims_out.1).max(1);
        let mut spectators = 1;
        for d in rest {
            if d * spectators > limit {
                break;
            }
            spectators *= d;
        }

        let block = [dims_out.1, dims_out.0, spectators];
        let new_size: usize = new_shape.iter().product();
        LaunchGeometry::Tiled {
            block,
            grid: grid_size(new_size, block),
            shared_mem_bytes: 8 * spectators * dims_in.0 * dims_in.1,
        }
    }

    /// Geometry for a contraction over one axis.
    pub fn single_axis(
        old_size: usize,
        new_size: usize,
        dims: (usize, usize),
        max_spectators: usize,
    ) -> Self {
        let (dim_out, dim_in) = dims;
        let spectators = max_spectators.min(old_size / dim_in.max(1)).max(1);
        let block = [1, dim_out, spectators];
        LaunchGeometry::Tiled {
            block,
            grid: grid_size(new_size, block),
            shared_mem_bytes: 8 * (dim_out * dim_in + dim_out * spectators),
        }
    }

    /// Geometry for a gather producing `out_shape`.
    pub fn gather(out_shape: &[usize]) -> Self {
        if out_shape.is_empty() {
            return LaunchGeometry::WholeCopy;
        }
        let block = [GATHER_GROUP_SIZE, 1, 1];
        LaunchGeometry::Tiled {
            block,
            grid: grid_size(out_shape.iter().product(), block),
            shared_mem_bytes: 0,
        }
    }

    /// Output elements per group.
    pub fn group_size(&self) -> usize {
        match self {
            LaunchGeometry::Tiled { block, .. } => block.iter().product::<usize>().max(1),
            LaunchGeometry::WholeCopy => usize::MAX,
        }
    }
}

fn grid_size(size: usize, block: [usize; 3]) -> usize {
    let group: usize = block.iter().product::<usize>().max(1);
    size.div_ceil(group).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_axis_batches_small_axes_first() {
        // Two qubits in the full basis, three spectators of 4, 4 and 2.
        let g = LaunchGeometry::two_axis(&[4, 4, 4, 4, 2], (0, 2), (4, 4), (4, 4), 256);
        let LaunchGeometry::Tiled { block, grid, shared_mem_bytes } = g else {
            panic!("expected a tiled geometry");
        };
        // limit = 16: 1, 1, 2, 4 fit (product 8), the next 4 does not.
        assert_eq!(block, [4, 4, 8]);
        assert_eq!(grid, (4 * 4 * 4 * 4 * 2) / 128);
        assert_eq!(shared_mem_bytes, 8 * 8 * 16);
    }

    #[test]
    fn test_two_axis_large_output_gets_one_spectator() {
        let g = LaunchGeometry::two_axis(&[9, 9, 4], (0, 1), (9, 9), (9, 9), 64);
        let LaunchGeometry::Tiled { block, .. } = g else {
            panic!("expected a tiled geometry");
        };
        assert_eq!(block, [9, 9, 1]);
    }

    #[test]
    fn test_single_axis_caps_spectators() {
        let g = LaunchGeometry::single_axis(4usize.pow(5), 4usize.pow(5), (4, 4), 64);
        assert_eq!(g.group_size(), 4 * 64);

        let small = LaunchGeometry::single_axis(4, 2, (2, 4), 64);
        assert_eq!(small.group_size(), 2);
    }

    #[test]
    fn test_gather_without_axes_is_whole_copy() {
        assert_eq!(LaunchGeometry::gather(&[]), LaunchGeometry::WholeCopy);
        let LaunchGeometry::Tiled { grid, .. } = LaunchGeometry::gather(&[2, 2, 2]) else {
            panic!("expected a tiled geometry");
        };
        assert_eq!(grid, 1);
    }
}
