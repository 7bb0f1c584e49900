//! Council constitution display

use aegis_council::select_panel;
use aegis_types::{Constitution, CouncilConfig, Pillar, VoteThreshold};

pub fn show(config: &CouncilConfig) -> anyhow::Result<()> {
    let constitution = Constitution::standard().with_min_pillars(config.min_pillars);
    let seats = constitution.seat_count();

    println!(
        "Council: {seats} seats, {} with veto authority",
        constitution.veto_seat_count()
    );
    for pillar in Pillar::ALL {
        let members: Vec<_> = constitution.pillar_members(pillar).collect();
        println!("\n{} ({})", pillar, members.len());
        for m in members {
            let ethics = if m.id == constitution.ethics_seat() { "  [ethics seat]" } else { "" };
            if m.veto_domains.is_empty() {
                println!("  {:<14}{ethics}", m.id);
            } else {
                println!("  {:<14} veto: {}{ethics}", m.id, m.veto_domains.join(", "));
            }
        }
    }

    println!("\nRequired approvals:");
    for threshold in [
        VoteThreshold::Majority,
        VoteThreshold::Supermajority,
        VoteThreshold::Unanimous,
    ] {
        println!("  {:<14} {}", threshold.to_string(), threshold.required_count(seats));
    }
    println!(
        "  quorum: {} participants from at least {} pillars",
        constitution.participation_quorum(),
        constitution.min_pillars()
    );

    let panel = select_panel(&constitution, &[], config.emergency_panel_size);
    println!("\nDefault emergency panel: {}", panel.join(", "));
    println!("Overturn window: {}h", config.overturn_window_hours);
    Ok(())
}
