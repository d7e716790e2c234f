use std::collections::VecDeque;

const NONE: usize = usize::MAX;
const UNREACHED: u32 = u32::MAX;
const EPS: f64 = 1e-12;

/// Capacitated directed graph with paired residual edges (edge `e` and its
/// reverse `e ^ 1`), solved with Dinic's algorithm.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    head: Vec<usize>,
    next: Vec<usize>,
    to: Vec<usize>,
    capacity: Vec<f64>,
}

impl FlowGraph {
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            head: vec![NONE; nodes],
            next: Vec::with_capacity(edges * 2),
            to: Vec::with_capacity(edges * 2),
            capacity: Vec::with_capacity(edges * 2),
        }
    }

    pub fn node_count(&self) -> usize {
        self.head.len()
    }

    fn push_edge(&mut self, from: usize, to: usize, capacity: f64) {
        self.next.push(self.head[from]);
        self.head[from] = self.to.len();
        self.to.push(to);
        self.capacity.push(capacity);
    }

    /// Edge `from -> to` with `forward` capacity and `backward` capacity on
    /// its reverse. An undirected link uses the same value for both.
    pub fn add_edge(&mut self, from: usize, to: usize, forward: f64, backward: f64) {
        self.push_edge(from, to, forward.max(0.0));
        self.push_edge(to, from, backward.max(0.0));
    }

    fn tail(&self, edge: usize) -> usize {
        self.to[edge ^ 1]
    }

    fn build_levels(&self, source: usize, level: &mut [u32]) {
        level.fill(UNREACHED);
        level[source] = 0;

        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e];
                if self.capacity[e] > EPS && level[v] == UNREACHED {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
                e = self.next[e];
            }
        }
    }

    /// Saturate a blocking flow on the current level graph. Iterative so long
    /// augmenting paths on large grids cannot exhaust the stack.
    fn blocking_flow(&mut self, source: usize, sink: usize, level: &mut [u32]) -> f64 {
        let mut cursor = self.head.clone();
        let mut path: Vec<usize> = Vec::new();
        let mut total = 0.0;
        let mut u = source;

        loop {
            if u == sink {
                let bottleneck = path
                    .iter()
                    .map(|&e| self.capacity[e])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.capacity[e] -= bottleneck;
                    self.capacity[e ^ 1] += bottleneck;
                }
                total += bottleneck;

                let saturated = path
                    .iter()
                    .position(|&e| self.capacity[e] <= EPS)
                    .unwrap_or(0);
                path.truncate(saturated);
                u = path.last().map_or(source, |&e| self.to[e]);
                continue;
            }

            let mut advanced = false;
            while cursor[u] != NONE {
                let e = cursor[u];
                let v = self.to[e];
                if self.capacity[e] > EPS && level[v] != UNREACHED && level[v] == level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                cursor[u] = self.next[e];
            }

            if advanced {
                continue;
            }

            // Dead end: drop `u` from the level graph and retreat.
            level[u] = UNREACHED;
            match path.pop() {
                Some(e) => {
                    u = self.tail(e);
                    cursor[u] = self.next[e];
                }
                None => break,
            }
        }

        total
    }

    /// Run max-flow and return the flow value together with the minimum cut:
    /// `true` for nodes still reachable from `source` in the residual graph.
    pub fn max_flow(&mut self, source: usize, sink: usize) -> (f64, Vec<bool>) {
        let mut level = vec![UNREACHED; self.node_count()];
        let mut flow = 0.0;

        loop {
            self.build_levels(source, &mut level);
            if level[sink] == UNREACHED {
                break;
            }
            flow += self.blocking_flow(source, sink, &mut level);
        }

        let source_side = level.iter().map(|&l| l != UNREACHED).collect();
        (flow, source_side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_flow_classic_network() {
        // s=0, t=5
        let mut graph = FlowGraph::with_capacity(6, 9);
        graph.add_edge(0, 1, 16.0, 0.0);
        graph.add_edge(0, 2, 13.0, 0.0);
        graph.add_edge(1, 2, 10.0, 0.0);
        graph.add_edge(2, 1, 4.0, 0.0);
        graph.add_edge(1, 3, 12.0, 0.0);
        graph.add_edge(3, 2, 9.0, 0.0);
        graph.add_edge(2, 4, 14.0, 0.0);
        graph.add_edge(4, 3, 7.0, 0.0);
        graph.add_edge(3, 5, 20.0, 0.0);
        graph.add_edge(4, 5, 4.0, 0.0);

        let (flow, source_side) = graph.max_flow(0, 5);
        assert!((flow - 23.0).abs() < 1e-9);
        assert!(source_side[0]);
        assert!(!source_side[5]);
    }

    #[test]
    fn test_min_cut_splits_weakly_linked_chain() {
        // s -> a == b -- weak -- c == d -> t
        let mut graph = FlowGraph::with_capacity(6, 5);
        let (s, t) = (4, 5);
        graph.add_edge(s, 0, 10.0, 0.0);
        graph.add_edge(0, 1, 8.0, 8.0);
        graph.add_edge(1, 2, 0.5, 0.5);
        graph.add_edge(2, 3, 8.0, 8.0);
        graph.add_edge(3, t, 10.0, 0.0);

        let (flow, source_side) = graph.max_flow(s, t);
        assert!((flow - 0.5).abs() < 1e-9);
        assert_eq!(&source_side[0..4], &[true, true, false, false]);
    }

    #[test]
    fn test_disconnected_sink_has_zero_flow() {
        let mut graph = FlowGraph::with_capacity(3, 1);
        graph.add_edge(0, 1, 5.0, 0.0);
        let (flow, source_side) = graph.max_flow(0, 2);
        assert_eq!(flow, 0.0);
        assert_eq!(source_side, vec![true, true, false]);
    }
}
