//! Fixed widget templates, one per challenge type.
//!
//! A widget receives `{ challenge, onAnswer, disabled }` and calls
//! `onAnswer(correct)` once the learner commits an answer. Templates are
//! static text; the assembler never interpolates content into them.

use worldsmith_types::ChallengeType;

#[derive(Debug)]
pub struct Widget {
    pub challenge_type: ChallengeType,
    /// Name of the function the template declares.
    pub name: &'static str,
    pub source: &'static str,
}

const MULTIPLE_CHOICE: &str = r##"function MultipleChoiceWidget({ challenge, onAnswer, disabled }) {
  return (
    <div className="options">
      {challenge.options.map((option, i) => (
        <button key={i} type="button" disabled={disabled} onClick={() => onAnswer(i === challenge.correct)}>
          {option}
        </button>
      ))}
    </div>
  );
}"##;

const TRUE_FALSE: &str = r##"function TrueFalseWidget({ challenge, onAnswer, disabled }) {
  return (
    <div className="options">
      <button type="button" disabled={disabled} onClick={() => onAnswer(challenge.correct === true)}>
        Wahr
      </button>
      <button type="button" disabled={disabled} onClick={() => onAnswer(challenge.correct === false)}>
        Falsch
      </button>
    </div>
  );
}"##;

const FILL_BLANK: &str = r##"function normalizeAnswer(text) {
  return String(text).trim().toLowerCase().replace(/\s+/g, " ");
}

function FillBlankWidget({ challenge, onAnswer, disabled }) {
  const [value, setValue] = useState("");
  const accepted = [challenge.correct].concat(challenge.alternatives || []).map(normalizeAnswer);
  const submit = (event) => {
    event.preventDefault();
    onAnswer(accepted.includes(normalizeAnswer(value)));
  };
  return (
    <form className="fill-blank" onSubmit={submit}>
      <input type="text" value={value} disabled={disabled} onChange={(event) => setValue(event.target.value)} />
      <button type="submit" disabled={disabled}>
        Prüfen
      </button>
    </form>
  );
}"##;

const NUMBER: &str = r##"function NumberWidget({ challenge, onAnswer, disabled }) {
  const [value, setValue] = useState("");
  const submit = (event) => {
    event.preventDefault();
    const parsed = parseFloat(value.replace(",", "."));
    onAnswer(!Number.isNaN(parsed) && Math.abs(parsed - challenge.correct) <= challenge.tolerance);
  };
  return (
    <form className="number" onSubmit={submit}>
      <input type="text" inputMode="decimal" value={value} disabled={disabled} onChange={(event) => setValue(event.target.value)} />
      {challenge.unit && <span className="unit">{challenge.unit}</span>}
      <button type="submit" disabled={disabled}>
        Prüfen
      </button>
    </form>
  );
}"##;

const SORTING: &str = r##"function SortingWidget({ challenge, onAnswer, disabled }) {
  const [order, setOrder] = useState(challenge.items);
  const move = (from, to) => {
    if (to < 0 || to >= order.length) {
      return;
    }
    const next = order.slice();
    const [item] = next.splice(from, 1);
    next.splice(to, 0, item);
    setOrder(next);
  };
  const submit = () => onAnswer(order.every((item, i) => item === challenge.correct[i]));
  return (
    <div className="sorting">
      <ol>
        {order.map((item, i) => (
          <li key={item}>
            <span>{item}</span>
            <button type="button" disabled={disabled} onClick={() => move(i, i - 1)}>
              ▲
            </button>
            <button type="button" disabled={disabled} onClick={() => move(i, i + 1)}>
              ▼
            </button>
          </li>
        ))}
      </ol>
      <button type="button" disabled={disabled} onClick={submit}>
        Prüfen
      </button>
    </div>
  );
}"##;

const MATCHING: &str = r##"function MatchingWidget({ challenge, onAnswer, disabled }) {
  const rights = challenge.pairs.map((pair) => pair.right).sort();
  const [picks, setPicks] = useState({});
  const pick = (left, right) => setPicks(Object.assign({}, picks, { [left]: right }));
  const submit = () => onAnswer(challenge.pairs.every((pair) => picks[pair.left] === pair.right));
  return (
    <div className="matching">
      {challenge.pairs.map((pair) => (
        <label key={pair.left}>
          <span>{pair.left}</span>
          <select value={picks[pair.left] || ""} disabled={disabled} onChange={(event) => pick(pair.left, event.target.value)}>
            <option value="">?</option>
            {rights.map((right) => (
              <option key={right} value={right}>
                {right}
              </option>
            ))}
          </select>
        </label>
      ))}
      <button type="button" disabled={disabled} onClick={submit}>
        Prüfen
      </button>
    </div>
  );
}"##;

const SIMULATION: &str = r##"function SimulationWidget({ challenge, onAnswer, disabled }) {
  const [value, setValue] = useState(challenge.min);
  const submit = () => onAnswer(Math.abs(value - challenge.target) <= challenge.tolerance);
  return (
    <div className="simulation">
      <label>
        <span>{challenge.parameter}</span>
        <input
          type="range"
          min={challenge.min}
          max={challenge.max}
          step={challenge.step}
          value={value}
          disabled={disabled}
          onChange={(event) => setValue(Number(event.target.value))}
        />
        <output>
          {value}
          {challenge.unit ? " " + challenge.unit : ""}
        </output>
      </label>
      <button type="button" disabled={disabled} onClick={submit}>
        Prüfen
      </button>
    </div>
  );
}"##;

const GAME: &str = r##"function GameWidget({ challenge, onAnswer, disabled }) {
  const items = Array.isArray(challenge.data.items) ? challenge.data.items : [];
  const [chosen, setChosen] = useState([]);
  const toggle = (i) => setChosen(chosen.includes(i) ? chosen.filter((c) => c !== i) : chosen.concat(i));
  const submit = () => onAnswer(items.length > 0 && items.every((item, i) => Boolean(item.good) === chosen.includes(i)));
  return (
    <div className="game" data-mechanic={challenge.mechanic}>
      <p className="win-condition">{challenge.winCondition}</p>
      {items.map((item, i) => (
        <button key={i} type="button" className={chosen.includes(i) ? "chosen" : ""} disabled={disabled} onClick={() => toggle(i)}>
          {item.label}
        </button>
      ))}
      <button type="button" disabled={disabled} onClick={submit}>
        Fertig
      </button>
    </div>
  );
}"##;

static WIDGETS: [Widget; 8] = [
    Widget {
        challenge_type: ChallengeType::MultipleChoice,
        name: "MultipleChoiceWidget",
        source: MULTIPLE_CHOICE,
    },
    Widget {
        challenge_type: ChallengeType::TrueFalse,
        name: "TrueFalseWidget",
        source: TRUE_FALSE,
    },
    Widget {
        challenge_type: ChallengeType::FillBlank,
        name: "FillBlankWidget",
        source: FILL_BLANK,
    },
    Widget {
        challenge_type: ChallengeType::Number,
        name: "NumberWidget",
        source: NUMBER,
    },
    Widget {
        challenge_type: ChallengeType::Sorting,
        name: "SortingWidget",
        source: SORTING,
    },
    Widget {
        challenge_type: ChallengeType::Matching,
        name: "MatchingWidget",
        source: MATCHING,
    },
    Widget {
        challenge_type: ChallengeType::Simulation,
        name: "SimulationWidget",
        source: SIMULATION,
    },
    Widget {
        challenge_type: ChallengeType::Game,
        name: "GameWidget",
        source: GAME,
    },
];

pub fn widget_for(challenge_type: ChallengeType) -> &'static Widget {
    // WIDGETS is declared in ChallengeType::ALL order.
    let index = ChallengeType::ALL
        .iter()
        .position(|t| *t == challenge_type)
        .unwrap_or_default();
    &WIDGETS[index]
}

/// Widgets for the given types, deduplicated, in the fixed emission order.
pub fn widgets_for(types: impl IntoIterator<Item = ChallengeType>) -> Vec<&'static Widget> {
    let used: Vec<ChallengeType> = types.into_iter().collect();
    WIDGETS
        .iter()
        .filter(|w| used.contains(&w.challenge_type))
        .collect()
}
