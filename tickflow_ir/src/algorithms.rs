//! Generic graph algorithms shared by the causality pass and the scheduler:
//! Tarjan's SCC decomposition and a deterministic topological sort of the
//! resulting condensation.
//!
//! Implemented over plain `usize` node indices so both
//! `tickflow_ir::passes::causality` (over `DepNode`s) and
//! `tickflow_rt::scheduler` (over `NodeId`s) can reuse it by mapping their
//! own key type to a dense index first.

/// Tarjan's strongly connected components algorithm over a graph given as
/// `n` nodes indexed `0..n` and an adjacency list `edges[u]` = successors of
/// `u`. Returns each node's SCC index; SCC indices are assigned in reverse
/// topological order (a node's SCC index is always >= the SCC index of every
/// node it depends on transitively, standard for Tarjan).
pub fn tarjan_scc(n: usize, edges: &[Vec<usize>]) -> Vec<usize> {
    struct State {
        index_counter: usize,
        scc_counter: usize,
        index: Vec<Option<usize>>,
        lowlink: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        result: Vec<usize>,
    }

    fn strongconnect(v: usize, edges: &[Vec<usize>], st: &mut State) {
        st.index[v] = Some(st.index_counter);
        st.lowlink[v] = st.index_counter;
        st.index_counter += 1;
        st.stack.push(v);
        st.on_stack[v] = true;

        for &w in &edges[v] {
            if st.index[w].is_none() {
                strongconnect(w, edges, st);
                st.lowlink[v] = st.lowlink[v].min(st.lowlink[w]);
            } else if st.on_stack[w] {
                st.lowlink[v] = st.lowlink[v].min(st.index[w].unwrap());
            }
        }

        if st.lowlink[v] == st.index[v].unwrap() {
            let scc_id = st.scc_counter;
            st.scc_counter += 1;
            loop {
                let w = st.stack.pop().unwrap();
                st.on_stack[w] = false;
                st.result[w] = scc_id;
                if w == v {
                    break;
                }
            }
        }
    }

    let mut st = State {
        index_counter: 0,
        scc_counter: 0,
        index: vec![None; n],
        lowlink: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        result: vec![0; n],
    };
    for v in 0..n {
        if st.index[v].is_none() {
            strongconnect(v, edges, &mut st);
        }
    }
    st.result
}

/// Deterministic Kahn topological sort over a DAG given as `n` nodes and
/// `edges[u]` = successors. Ties (multiple nodes with in-degree 0 available
/// at once) are broken by ascending node index, so the same input graph
/// always yields the same schedule (reproducibility).
///
/// Returns `None` if the graph has a cycle (the caller is expected to have
/// already decomposed into SCCs so this is only ever called on a
/// condensation DAG, where a cycle indicates an internal bug).
pub fn kahn_topo_sort(n: usize, edges: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut indegree = vec![0usize; n];
    for succs in edges {
        for &w in succs {
            indegree[w] += 1;
        }
    }
    let mut ready: std::collections::BTreeSet<usize> =
        (0..n).filter(|&v| indegree[v] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(&v) = ready.iter().next() {
        ready.remove(&v);
        order.push(v);
        for &w in &edges[v] {
            indegree[w] -= 1;
            if indegree[w] == 0 {
                ready.insert(w);
            }
        }
    }
    if order.len() == n {
        Some(order)
    } else {
        None
    }
}
