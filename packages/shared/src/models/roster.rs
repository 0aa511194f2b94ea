use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::models::piece::CreatureSet;
use crate::models::seed::{rng_for, SeedStream};

/// Species, item, ability, moves, nature, EV spread.
type BuiltinEntry = (&'static str, &'static str, &'static str, &'static str, &'static str, &'static str);

const PHYSICAL: &str = "252,252,,,4,";
const SPECIAL: &str = ",,,252,4,252";
const FAST_PHYSICAL: &str = ",252,,,4,252";
const BULKY: &str = "252,,252,,4,";

const BUILTIN: &[BuiltinEntry] = &[
    ("Pikachu", "lightball", "static", "thunderbolt,voltswitch,surf,grassknot", "Timid", SPECIAL),
    ("Charizard", "heavydutyboots", "solarpower", "fireblast,airslash,focusblast,roost", "Timid", SPECIAL),
    ("Blastoise", "leftovers", "torrent", "hydropump,icebeam,rapidspin,shellsmash", "Modest", SPECIAL),
    ("Venusaur", "blacksludge", "chlorophyll", "gigadrain,sludgebomb,earthpower,sleeppowder", "Modest", SPECIAL),
    ("Gengar", "lifeorb", "cursedbody", "shadowball,sludgewave,focusblast,nastyplot", "Timid", SPECIAL),
    ("Alakazam", "lifeorb", "magicguard", "psychic,shadowball,focusblast,nastyplot", "Timid", SPECIAL),
    ("Machamp", "choiceband", "guts", "closecombat,knockoff,stoneedge,bulletpunch", "Adamant", PHYSICAL),
    ("Gyarados", "heavydutyboots", "intimidate", "waterfall,earthquake,dragondance,temperflare", "Jolly", FAST_PHYSICAL),
    ("Lapras", "leftovers", "waterabsorb", "freezedry,hydropump,sparklingaria,thunderbolt", "Modest", SPECIAL),
    ("Snorlax", "leftovers", "thickfat", "bodyslam,curse,rest,sleeptalk", "Careful", BULKY),
    ("Dragonite", "heavydutyboots", "multiscale", "dragondance,extremespeed,earthquake,firepunch", "Adamant", PHYSICAL),
    ("Tyranitar", "choiceband", "sandstream", "stoneedge,crunch,earthquake,icepunch", "Adamant", PHYSICAL),
    ("Scizor", "choiceband", "technician", "bulletpunch,uturn,knockoff,closecombat", "Adamant", PHYSICAL),
    ("Heracross", "choicescarf", "moxie", "closecombat,megahorn,knockoff,stoneedge", "Jolly", FAST_PHYSICAL),
    ("Skarmory", "rockyhelmet", "sturdy", "bodypress,ironhead,roost,spikes", "Impish", BULKY),
    ("Houndoom", "lifeorb", "flashfire", "fireblast,darkpulse,sludgebomb,nastyplot", "Timid", SPECIAL),
    ("Ampharos", "leftovers", "static", "thunderbolt,dazzlinggleam,focusblast,voltswitch", "Modest", SPECIAL),
    ("Sceptile", "lifeorb", "overgrow", "leafstorm,focusblast,earthquake,dragonpulse", "Timid", SPECIAL),
    ("Blaziken", "lifeorb", "speedboost", "closecombat,flareblitz,knockoff,swordsdance", "Adamant", FAST_PHYSICAL),
    ("Swampert", "leftovers", "torrent", "earthquake,flipturn,knockoff,stealthrock", "Relaxed", BULKY),
    ("Gardevoir", "choicescarf", "trace", "moonblast,psychic,mysticalfire,trick", "Timid", SPECIAL),
    ("Aggron", "leftovers", "sturdy", "headsmash,heavyslam,earthquake,stealthrock", "Adamant", PHYSICAL),
    ("Salamence", "heavydutyboots", "intimidate", "dragondance,dualwingbeat,earthquake,outrage", "Jolly", FAST_PHYSICAL),
    ("Metagross", "choiceband", "clearbody", "meteormash,zenheadbutt,earthquake,bulletpunch", "Adamant", PHYSICAL),
    ("Garchomp", "rockyhelmet", "roughskin", "earthquake,dragontail,stealthrock,firefang", "Jolly", FAST_PHYSICAL),
    ("Lucario", "lifeorb", "innerfocus", "aurasphere,flashcannon,vacuumwave,nastyplot", "Timid", SPECIAL),
    ("Infernape", "lifeorb", "ironfist", "closecombat,flareblitz,machpunch,uturn", "Jolly", FAST_PHYSICAL),
    ("Togekiss", "leftovers", "serenegrace", "airslash,dazzlinggleam,roost,nastyplot", "Timid", SPECIAL),
    ("Weavile", "choiceband", "pressure", "tripleaxel,knockoff,iceshard,lowkick", "Jolly", FAST_PHYSICAL),
    ("Rotom-Wash", "leftovers", "levitate", "hydropump,voltswitch,willowisp,painsplit", "Bold", BULKY),
    ("Excadrill", "choicescarf", "moldbreaker", "earthquake,ironhead,rapidspin,rockslide", "Jolly", FAST_PHYSICAL),
    ("Volcarona", "heavydutyboots", "flamebody", "quiverdance,fierydance,bugbuzz,gigadrain", "Timid", SPECIAL),
    ("Hydreigon", "choicespecs", "levitate", "dracometeor,darkpulse,flamethrower,uturn", "Timid", SPECIAL),
    ("Ferrothorn", "leftovers", "ironbarbs", "gyroball,powerwhip,leechseed,spikes", "Relaxed", BULKY),
    ("Greninja", "lifeorb", "protean", "hydropump,darkpulse,icebeam,gunkshot", "Timid", SPECIAL),
    ("Talonflame", "heavydutyboots", "galewings", "bravebird,flareblitz,uturn,roost", "Jolly", FAST_PHYSICAL),
    ("Aegislash", "leftovers", "stancechange", "shadowball,shadowsneak,kingsshield,closecombat", "Quiet", SPECIAL),
    ("Sylveon", "leftovers", "pixilate", "hypervoice,wish,protect,calmmind", "Calm", BULKY),
    ("Goodra", "assaultvest", "sapsipper", "dracometeor,fireblast,sludgebomb,thunderbolt", "Modest", SPECIAL),
    ("Decidueye", "lifeorb", "longreach", "leafblade,spiritshackle,swordsdance,shadowsneak", "Adamant", FAST_PHYSICAL),
    ("Mimikyu", "lifeorb", "disguise", "swordsdance,playrough,shadowclaw,shadowsneak", "Jolly", FAST_PHYSICAL),
    ("Toxapex", "blacksludge", "regenerator", "scald,toxic,recover,haze", "Bold", BULKY),
    ("Corviknight", "leftovers", "pressure", "bravebird,bodypress,roost,defog", "Impish", BULKY),
    ("Dragapult", "choicespecs", "infiltrator", "shadowball,dracometeor,fireblast,uturn", "Timid", SPECIAL),
    ("Toxtricity", "throatspray", "punkrock", "overdrive,boomburst,sludgewave,voltswitch", "Modest", SPECIAL),
    ("Kingambit", "leftovers", "supremeoverlord", "kowtowcleave,suckerpunch,ironhead,swordsdance", "Adamant", PHYSICAL),
    ("Garganacl", "leftovers", "purifyingsalt", "saltcure,recover,bodypress,irondefense", "Careful", BULKY),
    ("Baxcalibur", "loadeddice", "thermalexchange", "iciclespear,glaiverush,earthquake,dragondance", "Jolly", FAST_PHYSICAL),
];

/// The catalogue of creature builds a match draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureRoster {
    sets: Vec<CreatureSet>,
}

impl CreatureRoster {
    pub fn builtin() -> Self {
        let sets = BUILTIN
            .iter()
            .map(|(species, item, ability, moves, nature, evs)| CreatureSet {
                species: species.to_string(),
                packed: format!(
                    "{}||{}|{}|{}|{}|{}|||||",
                    species,
                    item,
                    ability,
                    moves,
                    nature,
                    evs
                ),
            })
            .collect();
        CreatureRoster { sets }
    }

    pub fn from_sets(sets: Vec<CreatureSet>) -> Self {
        CreatureRoster { sets }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Deterministically draws `count` creatures for a match seed. The roster
    /// is walked in a seeded shuffle and reshuffled whenever it runs out, so
    /// repeats only appear once every entry has been used.
    pub fn draw(&self, seed: u64, count: usize) -> Vec<CreatureSet> {
        if self.sets.is_empty() {
            return Vec::new();
        }

        let mut rng = rng_for(seed, SeedStream::Roster, 0);
        let mut order: Vec<usize> = (0..self.sets.len()).collect();
        let mut drawn = Vec::with_capacity(count);

        while drawn.len() < count {
            order.shuffle(&mut rng);
            for index in &order {
                if drawn.len() == count {
                    break;
                }
                drawn.push(self.sets[*index].clone());
            }
        }

        drawn
    }
}

impl Default for CreatureRoster {
    fn default() -> Self {
        Self::builtin()
    }
}
