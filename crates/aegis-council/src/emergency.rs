use aegis_types::{Constitution, Pillar};

pub const MIN_PANEL: usize = 3;
pub const MAX_PANEL: usize = 5;

/// Choose the seats for an emergency panel.
///
/// Order of preference: the ethics seat, veto holders for `domains`, one seat
/// from each pillar not yet represented, then the remaining seats in table
/// order. `size` is clamped to 3..=5 and to the number of seats.
pub fn select_panel(constitution: &Constitution, domains: &[String], size: usize) -> Vec<String> {
    let size = size.clamp(MIN_PANEL, MAX_PANEL).min(constitution.seat_count());
    let mut panel: Vec<String> = Vec::with_capacity(size);
    let push = |panel: &mut Vec<String>, id: &str| {
        if panel.len() < size && !panel.iter().any(|p| p == id) {
            panel.push(id.to_string());
        }
    };

    push(&mut panel, constitution.ethics_seat());

    for domain in domains {
        for holder in constitution.veto_holders(domain) {
            push(&mut panel, &holder.id);
        }
    }

    for pillar in Pillar::ALL {
        let represented = panel
            .iter()
            .any(|id| constitution.pillar_of(id) == Some(pillar));
        if !represented {
            if let Some(first) = constitution.pillar_members(pillar).next() {
                push(&mut panel, &first.id);
            }
        }
    }

    for member in constitution.members() {
        push(&mut panel, &member.id);
    }
    panel
}
