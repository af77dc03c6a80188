//! Backtracking enumeration of track assignments.

use std::ops::ControlFlow;

use super::space::SearchSpace;

/// Calls `visit` once for every complete legal assignment.
///
/// Metals are assigned in ascending index order and each metal tries tracks in
/// ascending index order. `visit` may stop the search by returning
/// [`ControlFlow::Break`]. Returns the number of assignments visited.
pub fn search<F>(space: &SearchSpace, mut visit: F) -> usize
where
    F: FnMut(&[usize]) -> ControlFlow<()>,
{
    let mut assignment = Vec::with_capacity(space.num_metals());
    let mut visited = 0;
    let _ = extend(space, &mut assignment, &mut visited, &mut visit);
    visited
}

fn extend<F>(
    space: &SearchSpace,
    assignment: &mut Vec<usize>,
    visited: &mut usize,
    visit: &mut F,
) -> ControlFlow<()>
where
    F: FnMut(&[usize]) -> ControlFlow<()>,
{
    let metal = assignment.len();
    // Each prefix is extended once, so every complete assignment is unique.
    if metal == space.num_metals() {
        *visited += 1;
        return visit(assignment);
    }

    for track in 0..space.num_tracks() {
        if !space.can_place(metal, track, assignment) {
            continue;
        }
        assignment.push(track);
        let flow = extend(space, assignment, visited, visit);
        assignment.pop();
        if flow.is_break() {
            return flow;
        }
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use cellgeom::{Dir, Quad, Rect};

    use super::*;
    use crate::gds::{GdsBoundary, GdsElement, GdsLibrary, GdsStructure};
    use crate::layout::Layout;
    use crate::tech::{LayerInfo, LayerNum, LayerProperties, LayerRole, Rules};

    fn rect(layer: LayerNum, x0: i64, y0: i64, x1: i64, y1: i64) -> GdsElement {
        GdsElement::Boundary(GdsBoundary {
            layer,
            datatype: 0,
            xy: Quad::from_rect(Rect::from_xy(x0, y0, x1, y1))
                .ring()
                .into_iter()
                .map(<[i64; 2]>::from)
                .collect(),
        })
    }

    fn space(elements: Vec<GdsElement>) -> SearchSpace {
        let props = LayerProperties::builder()
            .layer(20, LayerInfo::new("M0", LayerRole::Metal, Dir::Horiz))
            .layer(50, LayerInfo::new("TrackGuide", LayerRole::TrackGuide, Dir::Horiz))
            .perm_layers(vec![20])
            .rules(Rules::builder().metal_end_spacing(10).build().unwrap())
            .build()
            .unwrap();
        let lib = GdsLibrary {
            version: Default::default(),
            timestamp: Default::default(),
            name: "LIB".into(),
            units: [0.001, 1e-9],
            structures: vec![GdsStructure {
                name: "CELL".into(),
                timestamp: Default::default(),
                elements,
            }],
            base_layout_name: None,
        };
        let layout = Layout::from_gds(&lib, &props).unwrap();
        SearchSpace::build(&layout, &props, Rect::from_xy(0, 0, 400, 400), None)
    }

    #[test]
    fn enumerates_in_ascending_order() {
        let space = space(vec![
            rect(50, 0, 99, 400, 101),
            rect(50, 0, 199, 400, 201),
            rect(50, 0, 299, 400, 301),
            rect(20, 0, 90, 100, 110),
            rect(20, 50, 190, 150, 210),
        ]);
        let mut seen = Vec::new();
        let n = search(&space, |a| {
            seen.push(a.to_vec());
            ControlFlow::Continue(())
        });
        assert_eq!(n, 6);
        assert_eq!(
            seen,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 2],
                vec![2, 0],
                vec![2, 1],
            ]
        );
    }

    #[test]
    fn break_stops_immediately() {
        let space = space(vec![
            rect(50, 0, 99, 400, 101),
            rect(50, 0, 199, 400, 201),
            rect(20, 0, 90, 100, 110),
            rect(20, 300, 190, 400, 210),
        ]);
        let mut calls = 0;
        let visited = search(&space, |_| {
            calls += 1;
            if calls == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(calls, 2);
        assert_eq!(visited, 2);
    }

    #[test]
    fn no_metals_yields_one_empty_assignment() {
        let space = space(vec![rect(50, 0, 99, 400, 101)]);
        let mut seen = Vec::new();
        search(&space, |a| {
            seen.push(a.to_vec());
            ControlFlow::Continue(())
        });
        assert_eq!(seen, vec![Vec::<usize>::new()]);
    }
}
