//! Deterministic world assembly: template slot-filling, no model calls.
//!
//! The emitted program is a single React-style module. It embeds the world
//! data as one JSON literal, declares the widgets the content needs in
//! widget-table order, and drives the injected `runtime` capability.

use std::collections::BTreeSet;

use worldsmith_types::{
    ChallengeType, GeneratedProgram, ProgramManifest, Result, Validate, WorldDocument,
};

use crate::widgets::{widgets_for, Widget};

const PRELUDE: &str = r##"// World program assembled by worldsmith.
import React, { useState } from "react";"##;

const HELPERS: &str = r##"const POINTS_PER_CHALLENGE = 10;

function assetUrl(assets, id) {
  if (!id) {
    return null;
  }
  if (assets && assets[id]) {
    return assets[id];
  }
  return WORLD.assets[id] || null;
}

function pointsFor(hintsUsed) {
  return Math.max(POINTS_PER_CHALLENGE - hintsUsed * 3, 1);
}

function backdrop(url) {
  return url ? { backgroundImage: "url(" + url + ")" } : undefined;
}

function HintLadder({ hints, revealed, onReveal }) {
  return (
    <div className="hints">
      {hints.slice(0, revealed).map((hint, i) => (
        <p key={i} className="hint">
          {hint}
        </p>
      ))}
      {revealed < hints.length && (
        <button type="button" className="hint-button" onClick={onReveal}>
          Tipp anzeigen
        </button>
      )}
    </div>
  );
}"##;

const SHELL: &str = r##"function ChallengeCard({ challenge, moduleIndex, runtime, onSolved }) {
  const Widget = WIDGETS[challenge.type];
  const [revealed, setRevealed] = useState(0);
  const [result, setResult] = useState(null);
  const [points, setPoints] = useState(0);
  const reveal = () => {
    runtime.emit("hint_revealed", { challengeId: challenge.id, level: revealed + 1 });
    setRevealed(revealed + 1);
  };
  const answer = (correct) => {
    if (correct) {
      const earned = pointsFor(revealed);
      runtime.reportScore(earned, { challengeId: challenge.id, moduleIndex, hintsUsed: revealed });
      runtime.emit("challenge_solved", { challengeId: challenge.id, moduleIndex });
      setPoints(earned);
      setResult("success");
    } else {
      runtime.emit("challenge_failed", { challengeId: challenge.id, moduleIndex });
      setResult("failure");
    }
  };
  return (
    <section className="challenge">
      <h3>{challenge.question}</h3>
      <Widget challenge={challenge} onAnswer={answer} disabled={result === "success"} />
      <HintLadder hints={challenge.hints} revealed={revealed} onReveal={reveal} />
      {result && <p className={"feedback " + result}>{challenge.feedback[result]}</p>}
      {result === "success" && (
        <button type="button" className="next" onClick={() => onSolved(points)}>
          Weiter
        </button>
      )}
    </section>
  );
}

function ModuleView({ module, assets, runtime, onComplete }) {
  const [step, setStep] = useState(0);
  const [earned, setEarned] = useState(0);
  const challenge = module.challenges[step];
  const solved = (points) => {
    const total = earned + points;
    setEarned(total);
    if (step + 1 < module.challenges.length) {
      setStep(step + 1);
    } else {
      onComplete(total);
    }
  };
  return (
    <main className={module.isFinal ? "module boss" : "module"} style={backdrop(module.background || assetUrl(assets, "hub_bg"))}>
      <h2>{module.title}</h2>
      {module.isFinal && <p className="boss-intro">{WORLD.bossIntro}</p>}
      <p className="module-intro">{module.intro}</p>
      <p className="guide-line">
        {WORLD.theme.guideName}: {module.guideLine}
      </p>
      <p className="progress">
        {step + 1} / {module.challenges.length}
      </p>
      <ChallengeCard key={challenge.id} challenge={challenge} moduleIndex={module.index} runtime={runtime} onSolved={solved} />
    </main>
  );
}

function Hub({ completed, assets, score, onEnter }) {
  const next = WORLD.modules.findIndex((m) => !completed.includes(m.index));
  return (
    <main className="hub" style={backdrop(assetUrl(assets, "hub_bg"))}>
      <h1>{WORLD.title}</h1>
      <p className="intro">{WORLD.intro}</p>
      <p className="score">
        {score} {WORLD.theme.currencyName}
      </p>
      <ul className="module-list">
        {WORLD.modules.map((m) => (
          <li key={m.index}>
            <button type="button" disabled={m.index !== next} onClick={() => onEnter(m.index)}>
              {completed.includes(m.index) ? "✓ " : ""}
              {m.title}
            </button>
          </li>
        ))}
      </ul>
    </main>
  );
}

function World({ runtime, assets }) {
  const [active, setActive] = useState(null);
  const [completed, setCompleted] = useState([]);
  const [score, setScore] = useState(0);
  const [finished, setFinished] = useState(false);
  const maxScore = WORLD.modules.reduce((sum, m) => sum + m.challenges.length * POINTS_PER_CHALLENGE, 0);

  const enter = (index) => {
    runtime.emit("module_entered", { moduleIndex: index });
    setActive(index);
  };

  const complete = (module, earned) => {
    const total = score + earned;
    const done = completed.concat(module.index);
    setScore(total);
    setCompleted(done);
    setActive(null);
    runtime.completeModule(module.index);
    if (module.isFinal || done.length === WORLD.modules.length) {
      setFinished(true);
      runtime.completeWorld(total);
    }
  };

  if (finished) {
    const passed = score * 100 >= WORLD.passingScore * maxScore;
    return (
      <main className="finale" style={backdrop(assetUrl(assets, "hub_bg"))}>
        <h1>{passed ? WORLD.victoryText : WORLD.outro}</h1>
        <p className="score">
          {score} / {maxScore} {WORLD.theme.currencyName}
        </p>
      </main>
    );
  }

  if (active !== null) {
    const module = WORLD.modules[active];
    return <ModuleView module={module} assets={assets} runtime={runtime} onComplete={(earned) => complete(module, earned)} />;
  }

  return <Hub completed={completed} assets={assets} score={score} onEnter={enter} />;
}

export default World;"##;

/// Turn a validated world document into program text plus manifest.
///
/// Output is byte-identical for identical input: all maps in the embedded
/// data are ordered and widgets are emitted in table order.
pub fn assemble(doc: &WorldDocument) -> Result<GeneratedProgram> {
    doc.validate()?;

    let used: BTreeSet<ChallengeType> = doc
        .modules
        .iter()
        .flat_map(|m| m.challenges.iter().map(|c| c.challenge_type()))
        .collect();
    let widgets = widgets_for(used);

    let data = serde_json::to_string_pretty(doc)?;

    let mut source = String::with_capacity(16 * 1024 + data.len());
    source.push_str(PRELUDE);
    source.push_str("\n\n// Embedded world data.\nconst WORLD = ");
    source.push_str(&data);
    source.push_str(";\n\n");
    source.push_str(HELPERS);
    source.push_str("\n\n");
    for widget in &widgets {
        source.push_str(widget.source);
        source.push_str("\n\n");
    }
    source.push_str(&widget_map(&widgets));
    source.push_str("\n\n");
    source.push_str(SHELL);
    source.push('\n');

    let manifest = ProgramManifest {
        assets: doc.assets.clone(),
        module_count: doc.modules.len(),
        challenge_count: doc.challenge_count(),
        passing_score: doc.passing_score,
        widgets: widgets.iter().map(|w| w.name.to_string()).collect(),
    };

    tracing::debug!(
        modules = manifest.module_count,
        challenges = manifest.challenge_count,
        widgets = manifest.widgets.len(),
        bytes = source.len(),
        "world assembled"
    );

    Ok(GeneratedProgram { source, manifest })
}

fn widget_map(widgets: &[&Widget]) -> String {
    let mut out = String::from("const WIDGETS = {\n");
    for widget in widgets {
        out.push_str(&format!(
            "  \"{}\": {},\n",
            widget.challenge_type.as_str(),
            widget.name
        ));
    }
    out.push_str("};");
    out
}
